use std::sync::Arc;

use tracing::error;

use crate::backend::{AuthEvent, AuthProvider, Session, Subscription};

/// Thin adapter over the auth provider: pull the current session, or
/// subscribe to session transitions.
pub struct SessionResolver<'a, A: AuthProvider + ?Sized> {
    auth: &'a A,
}

impl<'a, A: AuthProvider + ?Sized> SessionResolver<'a, A> {
    pub fn new(auth: &'a A) -> Self {
        Self { auth }
    }

    /// `None` when nobody is signed in. Provider failures are logged and
    /// reported as logged out.
    pub async fn current_session(&self) -> Option<Session> {
        match self.auth.get_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Error getting session");
                None
            }
        }
    }

    /// Registers `listener` for every login, logout and token refresh.
    ///
    /// The returned guard must be kept by whoever owns the listener. Dropping
    /// it unregisters the listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(AuthEvent, Option<&Session>) + Send + Sync + 'static,
    {
        self.auth.on_auth_state_change(Arc::new(listener))
    }
}
