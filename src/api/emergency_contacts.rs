use std::sync::Arc;

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::Cookies;
use tracing::{error, field::display};

use super::{error_response, require_session, AppState, UserContext};
use crate::contacts::{ContactSetReplacer, NewEmergencyContact, CONTACTS_TABLE};
use crate::error::ServiceError;

#[derive(Deserialize)]
pub struct ReplaceContactsRequest {
    #[serde(default)]
    pub contacts: Option<Vec<NewEmergencyContact>>,
}

// GET /emergency-contacts - the caller's contacts, oldest first
pub async fn list_emergency_contacts(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
) -> Response {
    let session = match require_session(&state, &context, &cookies).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let contacts = ContactSetReplacer::new(context.backend.as_ref())
        .list(Some(&session.user.id))
        .await
        .unwrap_or_default();
    (StatusCode::OK, Json(contacts)).into_response()
}

// PUT /emergency-contacts - replace the whole set
pub async fn replace_emergency_contacts(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
    Json(payload): Json<ReplaceContactsRequest>,
) -> Response {
    let session = match require_session(&state, &context, &cookies).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let replacer = ContactSetReplacer::new(context.backend.as_ref());
    match replacer
        .replace_all(&session.user.id, payload.contacts.as_deref())
        .await
    {
        Ok(Some(saved)) => {
            tracing::Span::current()
                .record("table", CONTACTS_TABLE)
                .record("action", "replace_emergency_contacts")
                .record("business_event", "Emergency contacts saved");
            (StatusCode::OK, Json(saved)).into_response()
        }
        Ok(None) => error_response(StatusCode::BAD_REQUEST, "contacts are required"),
        Err(ServiceError::Validation(message)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &message)
        }
        Err(e @ ServiceError::ContactsCleared(_)) => {
            error!(user_id = %session.user.id, error = %e, "emergency contacts lost during save");
            tracing::Span::current()
                .record("table", CONTACTS_TABLE)
                .record("action", "replace_emergency_contacts_error")
                .record("error", display(&e));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Your emergency contacts could not be saved and were removed. Please re-enter them.",
                    "contacts_cleared": true,
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::Span::current()
                .record("table", CONTACTS_TABLE)
                .record("action", "replace_emergency_contacts_error")
                .record("error", display(&e));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to save emergency contacts",
                    "contacts_cleared": false,
                })),
            )
                .into_response()
        }
    }
}
