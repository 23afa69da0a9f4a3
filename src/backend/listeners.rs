use std::sync::{Arc, Mutex, Weak};

use super::{AuthEvent, Session};

pub type AuthListener = Arc<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

#[derive(Default)]
struct Slots {
    next_id: u64,
    entries: Vec<(u64, AuthListener)>,
}

/// Auth state listeners owned by one auth provider instance.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: AuthListener) -> Subscription {
        let mut slots = lock(&self.slots);
        let id = slots.next_id;
        slots.next_id += 1;
        slots.entries.push((id, listener));
        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Invokes every registered listener.
    ///
    /// Listeners run without the lock held, so a listener may drop its own
    /// subscription or another one. A listener removed mid-emit is skipped.
    pub fn emit(&self, event: AuthEvent, session: Option<&Session>) {
        let ids: Vec<u64> = lock(&self.slots).entries.iter().map(|(id, _)| *id).collect();
        tracing::debug!(?event, listeners = ids.len(), "auth state changed");
        for id in ids {
            let listener = lock(&self.slots)
                .entries
                .iter()
                .find(|(entry, _)| *entry == id)
                .map(|(_, l)| l.clone());
            if let Some(listener) = listener {
                listener(event, session);
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(slots: &Mutex<Slots>) -> std::sync::MutexGuard<'_, Slots> {
    // A panicking listener must not wedge the registry.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for a registered auth listener.
///
/// The listener stays registered for as long as this value lives. Dropping it,
/// or calling [`Subscription::unsubscribe`], removes the listener.
#[must_use = "dropping a Subscription immediately unregisters its listener"]
pub struct Subscription {
    id: u64,
    slots: Weak<Mutex<Slots>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            lock(&slots).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> AuthListener {
        let counter = counter.clone();
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let sub = registry.register(counting(&hits));
        registry.emit(AuthEvent::SignedOut, None);
        drop(sub);
        registry.emit(AuthEvent::SignedOut, None);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = ListenerRegistry::new();
        let sub = registry.register(Arc::new(|_, _| {}));
        drop(registry);
        sub.unsubscribe();
    }

    #[test]
    fn listener_may_drop_subscription_during_emit() {
        let registry = ListenerRegistry::new();
        let holder: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let inner = holder.clone();
        let sub = registry.register(Arc::new(move |_, _| {
            inner.lock().unwrap().take();
        }));
        *holder.lock().unwrap() = Some(sub);

        registry.emit(AuthEvent::SignedOut, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn listener_removed_by_earlier_listener_is_skipped() {
        let registry = ListenerRegistry::new();
        let victim_hits = Arc::new(AtomicUsize::new(0));
        let victim_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = victim_slot.clone();
        let _first = registry.register(Arc::new(move |_, _| {
            slot.lock().unwrap().take();
        }));
        *victim_slot.lock().unwrap() = Some(registry.register(counting(&victim_hits)));

        registry.emit(AuthEvent::SignedOut, None);

        assert_eq!(victim_hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }
}
