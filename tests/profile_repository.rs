use resqnet_server::backend::{MemoryBackend, MemoryStore, Operation};
use resqnet_server::error::{BackendError, ServiceError};
use resqnet_server::profile::{PersonalInfoForm, ProfileRepository, ProfileUpdate, Role};
use serde_json::json;

fn seeded() -> (MemoryStore, String) {
    let store = MemoryStore::new();
    let id = store.register_user(
        "ana@example.com",
        "secret",
        json!({
            "full_name": "Ana Diaz",
            "phone": "555-0100",
            "address": "12 Harbour Rd",
            "role": "victim",
            "verified": true,
            "stats": {"totalAlerts": 3, "responseTime": "4 min", "trustScore": 92}
        }),
    );
    (store, id)
}

#[tokio::test]
async fn fetch_without_identity_makes_no_call() {
    let (store, _) = seeded();
    let backend = MemoryBackend::new(store.clone());
    let repo = ProfileRepository::new(&backend);

    assert!(repo.fetch(None).await.is_none());
    assert!(repo.fetch(Some("")).await.is_none());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn fetch_returns_stored_profile() {
    let (store, id) = seeded();
    let backend = MemoryBackend::new(store);
    let profile = ProfileRepository::new(&backend)
        .fetch(Some(&id))
        .await
        .expect("profile exists");

    assert_eq!(profile.id, id);
    assert_eq!(profile.full_name.as_deref(), Some("Ana Diaz"));
    assert_eq!(profile.role, Some(Role::Victim));
    assert!(profile.verified);
    assert_eq!(profile.stats.total_alerts, 3);
    assert_eq!(profile.stats.trust_score, 92);
    assert_eq!(profile.role_label(), "Help Seeker");
}

#[tokio::test]
async fn fetch_unknown_identity_is_absent() {
    let (store, _) = seeded();
    let backend = MemoryBackend::new(store);
    assert!(ProfileRepository::new(&backend)
        .fetch(Some("no-such-user"))
        .await
        .is_none());
}

#[tokio::test]
async fn fetch_swallows_storage_errors() {
    let (store, id) = seeded();
    store.fail_next(
        Operation::Select,
        Some("user_profiles"),
        BackendError::Transport("connection reset".into()),
    );
    let backend = MemoryBackend::new(store);

    assert!(ProfileRepository::new(&backend).fetch(Some(&id)).await.is_none());
}

#[tokio::test]
async fn role_update_changes_only_role() {
    let (store, id) = seeded();
    let backend = MemoryBackend::new(store);
    let repo = ProfileRepository::new(&backend);
    let before = repo.fetch(Some(&id)).await.unwrap();

    let updated = repo
        .update(&id, &ProfileUpdate::role(Role::Volunteer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.role, Some(Role::Volunteer));

    let after = repo.fetch(Some(&id)).await.unwrap();
    assert_eq!(after.role, Some(Role::Volunteer));
    assert_eq!(after.full_name, before.full_name);
    assert_eq!(after.email, before.email);
    assert_eq!(after.phone, before.phone);
    assert_eq!(after.address, before.address);
    assert_eq!(after.stats, before.stats);
    assert_eq!(after.verified, before.verified);
}

#[tokio::test]
async fn update_with_empty_identity_short_circuits() {
    let (store, _) = seeded();
    let backend = MemoryBackend::new(store.clone());

    let result = ProfileRepository::new(&backend)
        .update("", &ProfileUpdate::role(Role::Volunteer))
        .await;

    assert_eq!(result, Ok(None));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn update_failure_is_surfaced() {
    let (store, id) = seeded();
    store.fail_next(
        Operation::Update,
        Some("user_profiles"),
        BackendError::Status {
            status: 500,
            code: None,
            message: "boom".into(),
        },
    );
    let backend = MemoryBackend::new(store);

    let err = ProfileRepository::new(&backend)
        .update(&id, &ProfileUpdate::role(Role::Volunteer))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Storage(BackendError::Status { status: 500, .. })));
}

#[tokio::test]
async fn update_of_missing_profile_is_an_error() {
    let (store, _) = seeded();
    let backend = MemoryBackend::new(store);

    let err = ProfileRepository::new(&backend)
        .update("ghost", &ProfileUpdate::role(Role::Victim))
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::Storage(BackendError::NoRows));
}

#[tokio::test]
async fn switch_role_toggles_between_roles() {
    let (store, id) = seeded();
    let backend = MemoryBackend::new(store);
    let repo = ProfileRepository::new(&backend);

    let once = repo.switch_role(&id, Some(Role::Victim)).await.unwrap().unwrap();
    assert_eq!(once.role, Some(Role::Volunteer));

    let twice = repo.switch_role(&id, once.role).await.unwrap().unwrap();
    assert_eq!(twice.role, Some(Role::Victim));
}

#[tokio::test]
async fn personal_info_keeps_email() {
    let (store, id) = seeded();
    let backend = MemoryBackend::new(store);
    let repo = ProfileRepository::new(&backend);

    let form = PersonalInfoForm {
        name: "Ana María Diaz".into(),
        email: "hijacked@example.com".into(),
        phone: "555-0199".into(),
        address: "7 Quay St".into(),
    };
    let saved = repo.save_personal_info(&id, form).await.unwrap().unwrap();

    assert_eq!(saved.full_name.as_deref(), Some("Ana María Diaz"));
    assert_eq!(saved.phone.as_deref(), Some("555-0199"));
    assert_eq!(saved.email.as_deref(), Some("ana@example.com"));
    assert_eq!(saved.role, Some(Role::Victim));
}

#[tokio::test]
async fn loosely_typed_stats_still_load() {
    let store = MemoryStore::new();
    let id = store.register_user(
        "ana@example.com",
        "secret",
        json!({
            "role": "volunteer",
            "stats": {"totalAlerts": -1, "responseTime": 4, "trustScore": 71}
        }),
    );
    let backend = MemoryBackend::new(store);
    let repo = ProfileRepository::new(&backend);

    let profile = repo.fetch(Some(&id)).await.expect("profile still loads");
    assert_eq!(profile.stats.total_alerts, 0);
    assert_eq!(profile.stats.response_time_display(), "4");
    assert_eq!(profile.stats.trust_score, 71);

    let updated = repo
        .update(&id, &ProfileUpdate::role(Role::Victim))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.role, Some(Role::Victim));
}

#[tokio::test]
async fn unreadable_write_back_is_reported_as_saved() {
    let store = MemoryStore::new();
    // A phone column holding a number cannot be decoded as a profile.
    let id = store.register_user("ana@example.com", "secret", json!({"phone": 5550100}));
    let backend = MemoryBackend::new(store.clone());

    let err = ProfileRepository::new(&backend)
        .update(&id, &ProfileUpdate::role(Role::Volunteer))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::SavedUnreadable(BackendError::Decode(_))));
    let stored = store.rows("user_profiles");
    assert_eq!(stored[0]["role"], "volunteer");
}
