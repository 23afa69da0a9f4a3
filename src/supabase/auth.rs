use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{check, SupabaseClient};
use crate::backend::{AuthEvent, AuthListener, AuthProvider, AuthUser, Session, Subscription};
use crate::error::BackendError;

/// Sessions this close to expiry are refreshed before being handed out.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let now = chrono::Utc::now().timestamp();
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".into()),
            expires_at: self.expires_at.or(self.expires_in.map(|secs| now + secs)),
            user: self.user,
        }
    }
}

impl SupabaseClient {
    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.url, path)
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session, BackendError> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.config.anon_key)
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        Ok(token.into_session())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        info!(user_id = %session.user.id, "signed in");
        *self.session_slot() = Some(session.clone());
        self.listeners.emit(AuthEvent::SignedIn, Some(&session));
        Ok(session)
    }

    pub async fn refresh_session(&self) -> Result<Session, BackendError> {
        let refresh_token = self
            .session_slot()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or(BackendError::Unauthenticated)?;
        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        *self.session_slot() = Some(session.clone());
        self.listeners.emit(AuthEvent::TokenRefreshed, Some(&session));
        Ok(session)
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let current = self.session_slot().clone();
        match current {
            Some(session)
                if session.refresh_token.is_some()
                    && session.is_expired_at(chrono::Utc::now().timestamp(), EXPIRY_MARGIN_SECS) =>
            {
                self.refresh_session().await.map(Some)
            }
            other => Ok(other),
        }
    }

    fn on_auth_state_change(&self, listener: AuthListener) -> Subscription {
        self.listeners.register(listener)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.session_slot().clone() else {
            return Ok(());
        };

        let remote = match self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
        {
            Ok(response) => check(response).await.map(|_| ()),
            Err(e) => Err(BackendError::from(e)),
        };

        // The local session goes regardless; the token will simply expire.
        self.session_slot().take();
        self.listeners.emit(AuthEvent::SignedOut, None);

        match remote {
            Err(BackendError::Status { status: 401 | 404, .. }) => Ok(()),
            Err(e) => {
                warn!(user_id = %session.user.id, error = %e, "remote sign-out failed");
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }
}
