use async_trait::async_trait;
use serde_json::Value;

use super::{check, SupabaseClient};
use crate::backend::{Order, Query, RpcInvoker, TableStore};
use crate::error::BackendError;

const RETURN_REPRESENTATION: (&str, &str) = ("Prefer", "return=representation");

/// PostgREST query string for `query`: `col=eq.value` filters and
/// `order=col.asc|desc`.
pub(crate) fn query_params(query: &Query, with_select: bool) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(query.filters.len() + 2);
    if with_select {
        params.push(("select".to_string(), "*".to_string()));
    }
    for (column, value) in &query.filters {
        params.push((column.clone(), format!("eq.{value}")));
    }
    if let Some((column, order)) = &query.order {
        let dir = match order {
            Order::Ascending => "asc",
            Order::Descending => "desc",
        };
        params.push(("order".to_string(), format!("{column}.{dir}")));
    }
    params
}

impl SupabaseClient {
    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, path)
    }
}

#[async_trait]
impl TableStore for SupabaseClient {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let response = self
            .authorize(self.http.get(self.rest_url(&query.table)))
            .query(&query_params(query, true))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>, BackendError> {
        let response = self
            .authorize(self.http.patch(self.rest_url(&query.table)))
            .query(&query_params(query, true))
            .header(RETURN_REPRESENTATION.0, RETURN_REPRESENTATION.1)
            .json(&patch)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let response = self
            .authorize(self.http.post(self.rest_url(table)))
            .query(&[("select", "*")])
            .header(RETURN_REPRESENTATION.0, RETURN_REPRESENTATION.1)
            .json(&rows)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete(&self, query: &Query) -> Result<(), BackendError> {
        let response = self
            .authorize(self.http.delete(self.rest_url(&query.table)))
            .query(&query_params(query, false))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RpcInvoker for SupabaseClient {
    async fn rpc(&self, name: &str, args: Value) -> Result<Value, BackendError> {
        let response = self
            .authorize(self.http.post(self.rest_url(&format!("rpc/{name}"))))
            .json(&args)
            .send()
            .await?;
        // `returns void` functions answer 204 with no body.
        let text = check(response).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_postgrest_filters() {
        let query = Query::from("emergency_contacts")
            .eq("user_id", "42")
            .order("created_at", Order::Ascending);

        assert_eq!(
            query_params(&query, true),
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.42".to_string()),
                ("order".to_string(), "created_at.asc".to_string()),
            ]
        );
    }

    #[test]
    fn delete_params_skip_select() {
        let query = Query::from("emergency_contacts").eq("user_id", "42");
        assert_eq!(
            query_params(&query, false),
            vec![("user_id".to_string(), "eq.42".to_string())]
        );
    }
}
