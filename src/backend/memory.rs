//! In-process stand-in for the managed backend.
//!
//! `MemoryStore` owns the shared tables and credentials. `MemoryBackend` is a
//! per-user view onto it with its own session, the same way each browser tab
//! holds its own auth client against one shared database.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{
    AuthEvent, AuthListener, AuthProvider, AuthUser, Backend, Connector, ListenerRegistry, Order,
    Query, RpcInvoker, Session, Subscription, TableStore,
};
use crate::account::DELETE_ACCOUNT_RPC;
use crate::error::BackendError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Update,
    Insert,
    Delete,
    Rpc,
    SignIn,
    SignOut,
}

struct Fault {
    op: Operation,
    target: Option<String>,
    error: BackendError,
}

struct Credential {
    password: String,
    user_id: String,
}

struct StoreInner {
    tables: HashMap<String, Vec<Value>>,
    credentials: HashMap<String, Credential>,
    faults: Vec<Fault>,
    calls: Vec<(Operation, String)>,
    epoch: DateTime<Utc>,
    tick: i64,
}

impl StoreInner {
    /// Logs the call and returns the first matching injected fault, if any.
    fn enter(&mut self, op: Operation, target: &str) -> Result<(), BackendError> {
        self.calls.push((op, target.to_string()));
        let hit = self.faults.iter().position(|f| {
            f.op == op && f.target.as_deref().map_or(true, |t| t == target)
        });
        match hit {
            Some(idx) => Err(self.faults.remove(idx).error),
            None => Ok(()),
        }
    }

    /// Strictly increasing timestamps so `created_at` ordering is stable.
    fn next_timestamp(&mut self) -> String {
        self.tick += 1;
        (self.epoch + Duration::microseconds(self.tick)).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn stamp(&mut self, row: Value) -> Result<Value, BackendError> {
        let Value::Object(mut obj) = row else {
            return Err(BackendError::Decode("rows must be JSON objects".into()));
        };
        if !obj.get("id").is_some_and(|v| !v.is_null()) {
            obj.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        if !obj.get("created_at").is_some_and(|v| !v.is_null()) {
            let ts = self.next_timestamp();
            obj.insert("created_at".into(), Value::String(ts));
        }
        Ok(Value::Object(obj))
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                tables: HashMap::new(),
                credentials: HashMap::new(),
                faults: Vec::new(),
                calls: Vec::new(),
                epoch: Utc::now(),
                tick: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates credentials plus the `user_profiles` row a signup would create.
    /// `profile` supplies extra columns. Returns the new identity.
    pub fn register_user(&self, email: &str, password: &str, profile: Value) -> String {
        let user_id = Uuid::new_v4().to_string();
        let mut row = Map::new();
        row.insert("id".into(), json!(user_id));
        row.insert("email".into(), json!(email));
        row.insert("verified".into(), json!(false));
        row.insert("stats".into(), json!({}));
        if let Value::Object(extra) = profile {
            row.extend(extra);
        }

        let mut inner = self.lock();
        if let Ok(stamped) = inner.stamp(Value::Object(row)) {
            inner
                .tables
                .entry("user_profiles".into())
                .or_default()
                .push(stamped);
        }
        inner.credentials.insert(
            email.to_string(),
            Credential {
                password: password.to_string(),
                user_id: user_id.clone(),
            },
        );
        user_id
    }

    /// Inserts rows directly, bypassing the call log and fault injection.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut inner = self.lock();
        for row in rows {
            if let Ok(stamped) = inner.stamp(row) {
                inner.tables.entry(table.into()).or_default().push(stamped);
            }
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Makes the next `op` (optionally only against `target`, a table or
    /// procedure name) fail with `error`.
    pub fn fail_next(&self, op: Operation, target: Option<&str>, error: BackendError) {
        self.lock().faults.push(Fault {
            op,
            target: target.map(str::to_string),
            error,
        });
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(|(op, _)| *op).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn has_credentials(&self, email: &str) -> bool {
        self.lock().credentials.contains_key(email)
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<dyn Backend>, BackendError> {
        let backend = MemoryBackend::new(self.clone());
        backend.sign_in_with_password(email, password)?;
        Ok(Arc::new(backend))
    }
}

pub struct MemoryBackend {
    store: MemoryStore,
    session: Mutex<Option<Session>>,
    listeners: ListenerRegistry,
}

impl MemoryBackend {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            session: Mutex::new(None),
            listeners: ListenerRegistry::new(),
        }
    }

    /// A backend already holding a session for `user_id`.
    pub fn signed_in(store: MemoryStore, user_id: &str) -> Self {
        let backend = Self::new(store);
        *backend.session_slot() = Some(issue_session(user_id, None));
        backend
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let user_id = {
            let mut inner = self.store.lock();
            inner.enter(Operation::SignIn, email)?;
            match inner.credentials.get(email) {
                Some(c) if c.password == password => c.user_id.clone(),
                _ => {
                    return Err(BackendError::Status {
                        status: 400,
                        code: Some("invalid_grant".into()),
                        message: "Invalid login credentials".into(),
                    })
                }
            }
        };
        let session = issue_session(&user_id, Some(email));
        *self.session_slot() = Some(session.clone());
        self.listeners.emit(AuthEvent::SignedIn, Some(&session));
        Ok(session)
    }

    /// Rotates the access token the way a background refresh would.
    pub fn refresh(&self) -> Option<Session> {
        let refreshed = {
            let mut slot = self.session_slot();
            let current = slot.as_ref()?;
            let next = issue_session(&current.user.id, current.user.email.as_deref());
            *slot = Some(next.clone());
            next
        };
        self.listeners.emit(AuthEvent::TokenRefreshed, Some(&refreshed));
        Some(refreshed)
    }

    fn current_user_id(&self) -> Option<String> {
        self.session_slot().as_ref().map(|s| s.user.id.clone())
    }
}

fn issue_session(user_id: &str, email: Option<&str>) -> Session {
    Session {
        access_token: format!("memory-{}", Uuid::new_v4()),
        refresh_token: Some(Uuid::new_v4().to_string()),
        token_type: "bearer".into(),
        expires_at: None,
        user: AuthUser {
            id: user_id.to_string(),
            email: email.map(str::to_string),
        },
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.session_slot().clone())
    }

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription {
        self.listeners.register(listener)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let remote = self.store.lock().enter(Operation::SignOut, "logout");
        let had_session = self.session_slot().take().is_some();
        if had_session {
            self.listeners.emit(AuthEvent::SignedOut, None);
        }
        remote
    }
}

fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(col, want)| row.get(col).is_some_and(|v| filter_text(v) == *want))
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => filter_text(x).cmp(&filter_text(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl TableStore for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut inner = self.store.lock();
        inner.enter(Operation::Select, &query.table)?;
        let mut rows: Vec<Value> = inner
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| matches(r, &query.filters)).cloned().collect())
            .unwrap_or_default();
        if let Some((column, order)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column));
                match order {
                    Order::Ascending => ord,
                    Order::Descending => ord.reverse(),
                }
            });
        }
        Ok(rows)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>, BackendError> {
        let mut inner = self.store.lock();
        inner.enter(Operation::Update, &query.table)?;
        let Value::Object(patch) = patch else {
            return Err(BackendError::Decode("update patch must be a JSON object".into()));
        };
        let mut updated = Vec::new();
        if let Some(rows) = inner.tables.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|r| matches(r, &query.filters)) {
                if let Value::Object(obj) = &mut *row {
                    for (k, v) in &patch {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let mut inner = self.store.lock();
        inner.enter(Operation::Insert, table)?;
        let stamped = rows
            .into_iter()
            .map(|row| inner.stamp(row))
            .collect::<Result<Vec<_>, _>>()?;
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(stamped.iter().cloned());
        Ok(stamped)
    }

    async fn delete(&self, query: &Query) -> Result<(), BackendError> {
        let mut inner = self.store.lock();
        inner.enter(Operation::Delete, &query.table)?;
        if let Some(rows) = inner.tables.get_mut(&query.table) {
            rows.retain(|r| !matches(r, &query.filters));
        }
        Ok(())
    }
}

#[async_trait]
impl RpcInvoker for MemoryBackend {
    async fn rpc(&self, name: &str, _args: Value) -> Result<Value, BackendError> {
        let caller = self.current_user_id();
        let mut inner = self.store.lock();
        inner.enter(Operation::Rpc, name)?;

        if name != DELETE_ACCOUNT_RPC {
            return Err(BackendError::Status {
                status: 404,
                code: Some("PGRST202".into()),
                message: format!("Could not find the function public.{name}"),
            });
        }
        let uid = caller.ok_or(BackendError::Unauthenticated)?;

        // Mirrors the ON DELETE CASCADE chain hanging off auth.users.
        for (table, rows) in inner.tables.iter_mut() {
            let key = if table == "user_profiles" { "id" } else { "user_id" };
            rows.retain(|r| r.get(key).map(filter_text).as_deref() != Some(uid.as_str()));
        }
        inner.credentials.retain(|_, c| c.user_id != uid);
        Ok(Value::Null)
    }
}
