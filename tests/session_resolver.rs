use std::sync::{Arc, Mutex};

use resqnet_server::backend::{AuthEvent, AuthProvider, MemoryBackend, MemoryStore};
use resqnet_server::session::SessionResolver;
use serde_json::json;

fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store.register_user("ana@example.com", "secret", json!({}));
    store
}

#[tokio::test]
async fn no_session_before_login() {
    let backend = MemoryBackend::new(store());
    assert!(SessionResolver::new(&backend).current_session().await.is_none());
}

#[tokio::test]
async fn session_follows_login_and_logout() {
    let backend = MemoryBackend::new(store());
    let resolver = SessionResolver::new(&backend);

    let signed_in = backend
        .sign_in_with_password("ana@example.com", "secret")
        .unwrap();
    let current = resolver.current_session().await.unwrap();
    assert_eq!(current.user.id, signed_in.user.id);
    assert_eq!(current.user.email.as_deref(), Some("ana@example.com"));

    backend.sign_out().await.unwrap();
    assert!(resolver.current_session().await.is_none());
}

#[tokio::test]
async fn listener_sees_every_transition() {
    let backend = MemoryBackend::new(store());
    let seen: Arc<Mutex<Vec<(AuthEvent, bool)>>> = Arc::default();
    let sink = seen.clone();
    let _subscription = SessionResolver::new(&backend).subscribe(move |event, session| {
        sink.lock().unwrap().push((event, session.is_some()));
    });

    backend.sign_in_with_password("ana@example.com", "secret").unwrap();
    backend.refresh().unwrap();
    backend.sign_out().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (AuthEvent::SignedIn, true),
            (AuthEvent::TokenRefreshed, true),
            (AuthEvent::SignedOut, false),
        ]
    );
}

#[tokio::test]
async fn dropped_subscription_stops_delivery() {
    let backend = MemoryBackend::new(store());
    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    let subscription = SessionResolver::new(&backend).subscribe(move |_, _| {
        *sink.lock().unwrap() += 1;
    });

    backend.sign_in_with_password("ana@example.com", "secret").unwrap();
    drop(subscription);
    backend.refresh().unwrap();
    backend.sign_out().await.unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
}
