pub mod account;
pub mod auth;
pub mod emergency_contacts;
pub mod middleware;
pub mod profile;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};

use crate::backend::{Connector, Session};
use crate::session::SessionResolver;
pub use sessions::{SessionStore, UserContext};

pub const SESSION_COOKIE: &str = "resqnet_session";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct AppState {
    pub connector: Arc<dyn Connector>,
    pub sessions: SessionStore,
    /// Contexts unused for this long are swept, and the cookie expires with them.
    pub idle_timeout: Duration,
}

impl AppState {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            sessions: SessionStore::new(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// Gateway routes. Observability layers are added by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::current_session))
        .route(
            "/profile",
            get(profile::get_profile).patch(profile::update_personal_info),
        )
        .route("/profile/role", post(profile::switch_role))
        .route(
            "/emergency-contacts",
            get(emergency_contacts::list_emergency_contacts)
                .put(emergency_contacts::replace_emergency_contacts),
        )
        .route(
            "/account/deletion",
            post(account::request_deletion).delete(account::cancel_deletion),
        )
        .route("/account/deletion/confirm", post(account::confirm_deletion))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(auth::login))
        .merge(protected_routes)
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// (Re)issues the session cookie. Its lifetime slides with the idle timeout.
pub(crate) fn set_session_cookie(cookies: &Cookies, context: &UserContext, idle_timeout: Duration) {
    let mut cookie = Cookie::new(SESSION_COOKIE, context.key.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    let max_age = i64::try_from(idle_timeout.as_secs()).unwrap_or(i64::MAX);
    cookie.set_max_age(tower_cookies::cookie::time::Duration::seconds(max_age));
    cookies.add(cookie);
}

pub(crate) fn clear_session_cookie(cookies: &Cookies) {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);
}

/// Resolves the caller's identity for this request. A context whose session
/// is gone (signed out elsewhere, refresh failed) is closed and the request
/// is rejected.
pub(crate) async fn require_session(
    state: &AppState,
    context: &UserContext,
    cookies: &Cookies,
) -> Result<Session, Response> {
    match SessionResolver::new(context.backend.as_ref())
        .current_session()
        .await
    {
        Some(session) => {
            tracing::Span::current().record("user_id", session.user.id.as_str());
            Ok(session)
        }
        None => {
            state.sessions.close(&context.key);
            clear_session_cookie(cookies);
            Err(error_response(StatusCode::UNAUTHORIZED, "Session expired"))
        }
    }
}
