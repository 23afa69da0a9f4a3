use std::sync::{Arc, Mutex};

use resqnet_server::backend::{
    AuthEvent, AuthProvider, Order, Query, RpcInvoker, TableStore,
};
use resqnet_server::config::SupabaseConfig;
use resqnet_server::error::BackendError;
use resqnet_server::supabase::SupabaseClient;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON_KEY: &str = "anon-key";

fn token_body(access_token: &str) -> serde_json::Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-1",
        "user": {"id": "user-1", "email": "ana@example.com"}
    })
}

async fn signed_in_client(server: &MockServer) -> SupabaseClient {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .and(body_json(json!({"email": "ana@example.com", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-1")))
        .expect(1)
        .mount(server)
        .await;

    let client = SupabaseClient::new(
        reqwest::Client::new(),
        SupabaseConfig::new(server.uri(), ANON_KEY),
    );
    client
        .sign_in_with_password("ana@example.com", "secret")
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn sign_in_stores_session() {
    let server = MockServer::start().await;
    let client = signed_in_client(&server).await;

    let session = client.get_session().await.unwrap().unwrap();
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.user.id, "user-1");
    assert!(session.expires_at.is_some());
}

#[tokio::test]
async fn bad_credentials_surface_gotrue_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(
        reqwest::Client::new(),
        SupabaseConfig::new(server.uri(), ANON_KEY),
    );
    let err = client
        .sign_in_with_password("ana@example.com", "wrong")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BackendError::Status {
            status: 400,
            code: Some("invalid_grant".into()),
            message: "Invalid login credentials".into(),
        }
    );
    assert!(client.get_session().await.unwrap().is_none());
}

#[tokio::test]
async fn select_sends_filters_and_bearer_token() {
    let server = MockServer::start().await;
    let client = signed_in_client(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/emergency_contacts"))
        .and(query_param("select", "*"))
        .and(query_param("user_id", "eq.user-1"))
        .and(query_param("order", "created_at.asc"))
        .and(header("apikey", ANON_KEY))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c1", "user_id": "user-1", "name": "Marta"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client
        .select(
            &Query::from("emergency_contacts")
                .eq("user_id", "user-1")
                .order("created_at", Order::Ascending),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Marta");
}

#[tokio::test]
async fn update_asks_for_representation() {
    let server = MockServer::start().await;
    let client = signed_in_client(&server).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/user_profiles"))
        .and(query_param("id", "eq.user-1"))
        .and(header("Prefer", "return=representation"))
        .and(body_json(json!({"role": "volunteer"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "user-1", "role": "volunteer"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rows = client
        .update(
            &Query::from("user_profiles").eq("id", "user-1"),
            json!({"role": "volunteer"}),
        )
        .await
        .unwrap();
    assert_eq!(rows[0]["role"], "volunteer");
}

#[tokio::test]
async fn postgrest_errors_are_decoded() {
    let server = MockServer::start().await;
    let client = signed_in_client(&server).await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/emergency_contacts"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "permission denied for table emergency_contacts"
        })))
        .mount(&server)
        .await;

    let err = client
        .delete(&Query::from("emergency_contacts").eq("user_id", "user-1"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BackendError::Status {
            status: 403,
            code: Some("42501".into()),
            message: "permission denied for table emergency_contacts".into(),
        }
    );
}

#[tokio::test]
async fn void_rpc_returns_null() {
    let server = MockServer::start().await;
    let client = signed_in_client(&server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/delete_user_account"))
        .and(header("Authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let value = client.rpc("delete_user_account", json!({})).await.unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn sign_out_clears_session_even_when_remote_fails() {
    let server = MockServer::start().await;
    let client = signed_in_client(&server).await;
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let _subscription = client.on_auth_state_change(Arc::new(move |event, _| {
        sink.lock().unwrap().push(event);
    }));

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.sign_out().await;

    assert!(matches!(result, Err(BackendError::Status { status: 500, .. })));
    assert!(client.get_session().await.unwrap().is_none());
    assert_eq!(*events.lock().unwrap(), vec![AuthEvent::SignedOut]);
}

#[tokio::test]
async fn expired_session_is_refreshed_on_read() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "stale",
            "expires_in": 0,
            "refresh_token": "refresh-1",
            "user": {"id": "user-1", "email": "ana@example.com"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh")))
        .expect(1)
        .mount(&server)
        .await;

    let client = SupabaseClient::new(
        reqwest::Client::new(),
        SupabaseConfig::new(server.uri(), ANON_KEY),
    );
    client
        .sign_in_with_password("ana@example.com", "secret")
        .await
        .unwrap();

    let session = client.get_session().await.unwrap().unwrap();
    assert_eq!(session.access_token, "fresh");
}
