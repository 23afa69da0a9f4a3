use std::sync::Arc;

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tower_cookies::Cookies;
use tracing::field::display;

use super::{error_response, require_session, AppState, UserContext};
use crate::error::ServiceError;
use crate::profile::{PersonalInfoForm, Profile, ProfileRepository, Role, PROFILES_TABLE};

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub role_label: &'static str,
    pub alerts_caption: &'static str,
    pub response_time_display: String,
    pub personal_info: PersonalInfoForm,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            role_label: profile.role_label(),
            alerts_caption: profile.alerts_caption(),
            response_time_display: profile.stats.response_time_display().to_string(),
            personal_info: PersonalInfoForm::from_profile(&profile),
            profile,
        }
    }
}

fn profile_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Profile not found")
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
) -> Response {
    let session = match require_session(&state, &context, &cookies).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match ProfileRepository::new(context.backend.as_ref())
        .fetch(Some(&session.user.id))
        .await
    {
        Some(profile) => (StatusCode::OK, Json(ProfileResponse::from(profile))).into_response(),
        None => profile_not_found(),
    }
}

/// PATCH /profile - save the personal information form. Email in the
/// payload is ignored.
pub async fn update_personal_info(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
    Json(form): Json<PersonalInfoForm>,
) -> Response {
    let session = match require_session(&state, &context, &cookies).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let repo = ProfileRepository::new(context.backend.as_ref());
    match repo.save_personal_info(&session.user.id, form).await {
        Ok(Some(profile)) => {
            tracing::Span::current()
                .record("table", PROFILES_TABLE)
                .record("action", "update_personal_info")
                .record("business_event", "Personal info saved");
            (StatusCode::OK, Json(ProfileResponse::from(profile))).into_response()
        }
        Ok(None) => profile_not_found(),
        Err(e @ ServiceError::SavedUnreadable(_)) => {
            tracing::Span::current()
                .record("table", PROFILES_TABLE)
                .record("action", "update_personal_info")
                .record("error", display(&e));
            (
                StatusCode::OK,
                Json(json!({ "saved": true, "profile": null })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::Span::current()
                .record("table", PROFILES_TABLE)
                .record("action", "update_personal_info_error")
                .record("error", display(&e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save personal info")
        }
    }
}

/// POST /profile/role - flip between help seeker and volunteer.
pub async fn switch_role(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<Arc<UserContext>>,
    cookies: Cookies,
) -> Response {
    let session = match require_session(&state, &context, &cookies).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let repo = ProfileRepository::new(context.backend.as_ref());
    let Some(current) = repo.fetch(Some(&session.user.id)).await else {
        return profile_not_found();
    };
    let next = Role::toggled(current.role);

    match repo.switch_role(&session.user.id, current.role).await {
        Ok(Some(profile)) => {
            tracing::Span::current()
                .record("table", PROFILES_TABLE)
                .record("action", "switch_role")
                .record("business_event", next.as_str());
            (
                StatusCode::OK,
                Json(json!({
                    "profile": ProfileResponse::from(profile),
                    "redirect": next.dashboard_path(),
                })),
            )
                .into_response()
        }
        Ok(None) => profile_not_found(),
        Err(e @ ServiceError::SavedUnreadable(_)) => {
            tracing::Span::current()
                .record("table", PROFILES_TABLE)
                .record("action", "switch_role")
                .record("error", display(&e));
            (
                StatusCode::OK,
                Json(json!({
                    "saved": true,
                    "profile": null,
                    "redirect": next.dashboard_path(),
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::Span::current()
                .record("table", PROFILES_TABLE)
                .record("action", "switch_role_error")
                .record("error", display(&e));
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to switch role")
        }
    }
}
