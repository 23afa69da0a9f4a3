use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tower_cookies::Cookies;
use tracing::field::display;

use super::{clear_session_cookie, error_response, require_session, AppState, UserContext};
use crate::account::{AccountEraser, ERASED_DATA};

const AFTER_DELETION_REDIRECT: &str = "/login-register";

// POST /account/deletion - ask for confirmation
pub async fn request_deletion(Extension(context): Extension<Arc<UserContext>>) -> Response {
    let requested = context.deletion().request();
    match requested {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "state": "confirming",
                "warning": "Once you delete your account, there is no going back.",
                "erases": ERASED_DATA,
            })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, &e.to_string()),
    }
}

// DELETE /account/deletion - back out of the confirmation
pub async fn cancel_deletion(Extension(context): Extension<Arc<UserContext>>) -> Response {
    let cancelled = context.deletion().cancel();
    match cancelled {
        Ok(()) => (StatusCode::OK, Json(json!({ "state": "idle" }))).into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, &e.to_string()),
    }
}

// POST /account/deletion/confirm - erase the account
pub async fn confirm_deletion(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
) -> Response {
    // Refreshes a stale access token before the RPC runs as this user.
    if let Err(response) = require_session(&state, &context, &cookies).await {
        return response;
    }

    let confirmed = context.deletion().confirm();
    if let Err(e) = confirmed {
        return error_response(StatusCode::CONFLICT, &e.to_string());
    }

    let outcome = AccountEraser::new(context.backend.as_ref())
        .delete_account()
        .await;
    let completed = context.deletion().complete(&outcome);
    if let Err(e) = completed {
        tracing::warn!(error = %e, "deletion flow out of step");
    }

    if outcome.success {
        state.sessions.close(&context.key);
        clear_session_cookie(&cookies);
        tracing::Span::current()
            .record("action", "delete_account")
            .record("business_event", "Account deleted");
        (
            StatusCode::OK,
            Json(json!({ "message": "Account deleted", "redirect": AFTER_DELETION_REDIRECT })),
        )
            .into_response()
    } else {
        if let Some(e) = &outcome.error {
            tracing::Span::current()
                .record("action", "delete_account_error")
                .record("error", display(e));
        }
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete account. Please try again or contact support.",
        )
    }
}
