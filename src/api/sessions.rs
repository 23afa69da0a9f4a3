use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::account::DeletionFlow;
use crate::backend::{AuthEvent, AuthProvider, Backend, Subscription};
use crate::session::SessionResolver;

type Contexts = RwLock<HashMap<Uuid, Arc<UserContext>>>;

/// Everything the gateway keeps for one signed-in browser.
pub struct UserContext {
    pub key: Uuid,
    pub backend: Arc<dyn Backend>,
    deletion: Mutex<DeletionFlow>,
    last_used: Mutex<Instant>,
    // Evicts this context on sign-out; dropped with it.
    _subscription: Subscription,
}

impl UserContext {
    pub fn deletion(&self) -> MutexGuard<'_, DeletionFlow> {
        self.deletion
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the context as used by a request.
    pub fn touch(&self) {
        *self.last_used_slot() = Instant::now();
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_used_slot())
    }

    fn last_used_slot(&self) -> MutexGuard<'_, Instant> {
        self.last_used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cookie key → per-user context.
#[derive(Clone, Default)]
pub struct SessionStore {
    contexts: Arc<Contexts>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly signed-in backend and returns its context.
    pub fn open(&self, backend: Arc<dyn Backend>) -> Arc<UserContext> {
        let key = Uuid::new_v4();
        let contexts = Arc::downgrade(&self.contexts);
        let subscription = SessionResolver::new(backend.as_ref()).subscribe(move |event, _| {
            if event == AuthEvent::SignedOut {
                evict(&contexts, &key);
            }
        });

        let context = Arc::new(UserContext {
            key,
            backend,
            deletion: Mutex::new(DeletionFlow::new()),
            last_used: Mutex::new(Instant::now()),
            _subscription: subscription,
        });
        let count = {
            let mut map = write(&self.contexts);
            map.insert(key, context.clone());
            map.len()
        };
        crate::metrics::set_active_sessions(count);
        context
    }

    pub fn get(&self, key: &Uuid) -> Option<Arc<UserContext>> {
        self.contexts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn close(&self, key: &Uuid) {
        evict(&Arc::downgrade(&self.contexts), key);
    }

    /// Removes and returns every context unused for at least `max_idle`.
    pub fn take_idle(&self, max_idle: Duration) -> Vec<Arc<UserContext>> {
        let now = Instant::now();
        let (idle, count) = {
            let mut map = write(&self.contexts);
            let keys: Vec<Uuid> = map
                .iter()
                .filter(|(_, context)| context.idle_for(now) >= max_idle)
                .map(|(key, _)| *key)
                .collect();
            let idle: Vec<_> = keys.iter().filter_map(|key| map.remove(key)).collect();
            (idle, map.len())
        };
        if !idle.is_empty() {
            crate::metrics::set_active_sessions(count);
        }
        idle
    }

    /// Evicts idle contexts and signs each one out so its refresh token is
    /// revoked. Returns how many were evicted.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let idle = self.take_idle(max_idle);
        for context in &idle {
            if let Err(e) = context.backend.sign_out().await {
                warn!(session = %context.key, error = %e, "sign-out of idle session failed");
            }
        }
        if !idle.is_empty() {
            info!(evicted = idle.len(), "idle session contexts swept");
        }
        idle.len()
    }

    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write(contexts: &Contexts) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Arc<UserContext>>> {
    contexts
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn evict(contexts: &Weak<Contexts>, key: &Uuid) {
    let Some(contexts) = contexts.upgrade() else {
        return;
    };
    let (removed, count) = {
        let mut map = write(&contexts);
        (map.remove(key), map.len())
    };
    if removed.is_some() {
        info!(session = %key, "session context closed");
        crate::metrics::set_active_sessions(count);
    }
    // `removed` (and possibly the context) is dropped here, outside the lock.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryStore, Operation};

    #[tokio::test]
    async fn sign_out_evicts_context() {
        let store = MemoryStore::new();
        let sessions = SessionStore::new();
        let context = sessions.open(Arc::new(MemoryBackend::signed_in(store, "user-1")));
        assert_eq!(sessions.len(), 1);

        context.backend.sign_out().await.unwrap();

        assert!(sessions.get(&context.key).is_none());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn sweep_signs_out_idle_contexts() {
        let store = MemoryStore::new();
        let sessions = SessionStore::new();
        let idle = sessions.open(Arc::new(MemoryBackend::signed_in(store.clone(), "user-1")));

        assert_eq!(sessions.sweep_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(sessions.len(), 1);

        assert_eq!(sessions.sweep_idle(Duration::ZERO).await, 1);
        assert!(sessions.get(&idle.key).is_none());
        assert!(idle.backend.get_session().await.unwrap().is_none());
        assert!(store.calls().contains(&Operation::SignOut));
    }

    #[test]
    fn touch_resets_idle_time() {
        let sessions = SessionStore::new();
        let context = sessions.open(Arc::new(MemoryBackend::signed_in(
            MemoryStore::new(),
            "user-1",
        )));
        let later = Instant::now() + Duration::from_secs(120);
        assert!(context.idle_for(later) >= Duration::from_secs(120));

        context.touch();
        assert!(context.idle_for(Instant::now()) < Duration::from_secs(120));
    }

    #[test]
    fn close_is_idempotent() {
        let sessions = SessionStore::new();
        let context = sessions.open(Arc::new(MemoryBackend::signed_in(
            MemoryStore::new(),
            "user-1",
        )));
        sessions.close(&context.key);
        sessions.close(&context.key);
        assert!(sessions.is_empty());
    }
}
