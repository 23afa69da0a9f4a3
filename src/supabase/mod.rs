//! reqwest client for a Supabase project: GoTrue for auth, PostgREST for
//! tables and RPC.

mod auth;
mod rest;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::backend::{Backend, Connector, ListenerRegistry, Session};
use crate::config::SupabaseConfig;
use crate::error::BackendError;

/// One auth context against a Supabase project.
///
/// Holds at most one session. Table and RPC calls run as that session's user
/// (or as `anon` when signed out), so row-level security applies.
pub struct SupabaseClient {
    http: Client,
    config: SupabaseConfig,
    session: Mutex<Option<Session>>,
    listeners: ListenerRegistry,
}

impl SupabaseClient {
    pub fn new(http: Client, config: SupabaseConfig) -> Self {
        Self {
            http,
            config,
            session: Mutex::new(None),
            listeners: ListenerRegistry::new(),
        }
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn access_token(&self) -> String {
        self.session_slot()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    /// Adds the project key and the caller's bearer token.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.access_token())
    }
}

/// Signs users in against Supabase, one [`SupabaseClient`] per user.
#[derive(Clone)]
pub struct SupabaseConnector {
    http: Client,
    config: SupabaseConfig,
}

impl SupabaseConnector {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Connector for SupabaseConnector {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<dyn Backend>, BackendError> {
        let client = SupabaseClient::new(self.http.clone(), self.config.clone());
        client.sign_in_with_password(email, password).await?;
        Ok(Arc::new(client))
    }
}

// PostgREST uses `code`/`message`; GoTrue uses `error_code`/`msg` or the
// OAuth-style `error`/`error_description`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    error_code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Passes 2xx responses through and turns anything else into
/// [`BackendError::Status`].
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    let code = body.error_code.or(body.error.clone()).or(match body.code {
        Some(Value::String(s)) => Some(s),
        _ => None,
    });
    let message = body
        .message
        .or(body.msg)
        .or(body.error_description)
        .or(body.error)
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });

    Err(BackendError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}
