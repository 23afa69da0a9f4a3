//! Contracts for the managed backend this service sits on: an auth provider,
//! generic table storage and remote procedure invocation.

pub mod listeners;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

pub use listeners::{AuthListener, ListenerRegistry, Subscription};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryBackend, MemoryStore, Operation};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix timestamp (seconds) after which the access token is rejected.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn is_expired_at(&self, now: i64, margin_secs: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now + margin_secs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current session, or `None` when logged out.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription;

    async fn sign_out(&self) -> Result<(), BackendError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// A table read/write target: equality filters and an optional ordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<(String, String)>,
    pub order: Option<(String, Order)>,
}

impl Query {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order = Some((column.into(), order));
        self
    }
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Applies `patch` to every matching row and returns the updated rows.
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>, BackendError>;

    /// Inserts `rows` and returns them as stored, with storage-assigned columns.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError>;

    async fn delete(&self, query: &Query) -> Result<(), BackendError>;
}

#[async_trait]
pub trait RpcInvoker: Send + Sync {
    async fn rpc(&self, name: &str, args: Value) -> Result<Value, BackendError>;
}

/// Everything a signed-in user's requests need from the backend.
pub trait Backend: AuthProvider + TableStore + RpcInvoker {}

impl<T: AuthProvider + TableStore + RpcInvoker> Backend for T {}

/// Produces a backend scoped to a freshly signed-in user.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<dyn Backend>, BackendError>;
}

/// Exactly-one-row read.
pub fn single(rows: Vec<Value>) -> Result<Value, BackendError> {
    match rows.len() {
        0 => Err(BackendError::NoRows),
        1 => Ok(rows.into_iter().next().unwrap_or(Value::Null)),
        n => Err(BackendError::MultipleRows(n)),
    }
}
