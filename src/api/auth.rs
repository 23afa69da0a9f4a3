use std::sync::Arc;

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower_cookies::Cookies;
use tracing::field::display;

use super::{clear_session_cookie, error_response, require_session, set_session_cookie, AppState, UserContext};
use crate::backend::AuthProvider;
use crate::error::BackendError;
use crate::session::SessionResolver;

#[derive(serde::Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let backend = match state.connector.sign_in(&payload.email, &payload.password).await {
        Ok(backend) => backend,
        Err(BackendError::Status { status: 400 | 401, .. }) => {
            tracing::Span::current()
                .record("action", "login_user_failed")
                .record("error", "invalid_credentials");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid email or password");
        }
        Err(e) => {
            tracing::Span::current()
                .record("action", "login_user_error")
                .record("error", display(&e));
            return error_response(StatusCode::BAD_GATEWAY, "Authentication service unavailable");
        }
    };

    let session = SessionResolver::new(backend.as_ref()).current_session().await;
    let context = state.sessions.open(backend);
    set_session_cookie(&cookies, &context, state.idle_timeout);

    let (user_id, email) = session
        .map(|s| (s.user.id, s.user.email))
        .unwrap_or_default();
    tracing::Span::current()
        .record("action", "login_user")
        .record("user_id", user_id.as_str())
        .record("business_event", "User logged in successfully");

    (
        StatusCode::OK,
        Json(json!({ "user_id": user_id, "email": email })),
    )
        .into_response()
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
) -> Response {
    // The local session is dropped even when the provider call fails.
    if let Err(e) = context.backend.sign_out().await {
        tracing::warn!(error = %e, "sign-out failed upstream");
    }
    state.sessions.close(&context.key);
    clear_session_cookie(&cookies);

    tracing::Span::current()
        .record("action", "logout_user")
        .record("business_event", "User logged out");

    (StatusCode::OK, Json(json!({ "message": "Logged out" }))).into_response()
}

pub async fn current_session(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
) -> Response {
    match require_session(&state, &context, &cookies).await {
        Ok(session) => (
            StatusCode::OK,
            Json(json!({
                "user_id": session.user.id,
                "email": session.user.email,
                "expires_at": session.expires_at,
            })),
        )
            .into_response(),
        Err(response) => response,
    }
}
