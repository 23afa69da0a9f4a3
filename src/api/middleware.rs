use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use super::{error_response, set_session_cookie, AppState, SESSION_COOKIE};

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    let context = cookies
        .get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse::<Uuid>().ok())
        .and_then(|key| state.sessions.get(&key));

    match context {
        Some(context) => {
            context.touch();
            set_session_cookie(&cookies, &context, state.idle_timeout);
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        None => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}
