use thiserror::Error;

/// Failures reported by the auth provider, table storage or RPC layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("no rows returned where exactly one was expected")]
    NoRows,

    #[error("{0} rows returned where exactly one was expected")]
    MultipleRows(usize),

    #[error("failed to decode backend payload: {0}")]
    Decode(String),

    #[error("no authenticated session")]
    Unauthenticated,
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

/// Errors surfaced by the profile, contact and account operations.
///
/// Reads never produce these: they degrade to an absent result instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    /// Rejected before any storage call was made.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[source] BackendError),

    /// The previous contact set was deleted but the new one could not be
    /// written. Storage now holds no contacts for the user.
    #[error("emergency contacts were cleared but could not be saved: {0}")]
    ContactsCleared(#[source] BackendError),

    /// The write went through but the stored record could not be decoded.
    #[error("saved, but the stored record could not be read back: {0}")]
    SavedUnreadable(#[source] BackendError),

    #[error("account deletion failed: {0}")]
    CascadeDelete(#[source] BackendError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}
