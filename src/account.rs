use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::backend::{AuthProvider, RpcInvoker};
use crate::error::ServiceError;

pub const DELETE_ACCOUNT_RPC: &str = "delete_user_account";

/// What the account deletion removes, in the order it is shown to the user
/// before they confirm.
pub const ERASED_DATA: [&str; 4] = [
    "Profile information",
    "Emergency contacts",
    "Alert history",
    "Response records",
];

#[derive(Debug, Clone, PartialEq)]
pub struct DeletionOutcome {
    pub success: bool,
    pub error: Option<ServiceError>,
}

/// Erases the signed-in user's account.
pub struct AccountEraser<'a, B: AuthProvider + RpcInvoker + ?Sized> {
    backend: &'a B,
}

impl<'a, B: AuthProvider + RpcInvoker + ?Sized> AccountEraser<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Runs the storage-side cascade for the caller's own identity, then
    /// signs out.
    ///
    /// A failed sign-out does not fail the deletion. A failed cascade skips
    /// sign-out, and the call can simply be retried.
    pub async fn delete_account(&self) -> DeletionOutcome {
        if let Err(e) = self.backend.rpc(DELETE_ACCOUNT_RPC, json!({})).await {
            error!(error = %e, "Error deleting user account");
            crate::metrics::record_account_deletion(false);
            return DeletionOutcome {
                success: false,
                error: Some(ServiceError::CascadeDelete(e)),
            };
        }
        crate::metrics::record_account_deletion(true);
        info!("user account deleted");

        if let Err(e) = self.backend.sign_out().await {
            warn!(error = %e, "sign-out after account deletion failed");
        }

        DeletionOutcome {
            success: true,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeletionState {
    #[default]
    Idle,
    Confirming,
    Deleting,
    Done,
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: DeletionState,
    },
}

/// Confirmation flow in front of [`AccountEraser`].
///
/// `Deleting` is only reachable through an explicit `confirm()` from
/// `Confirming`. A failure drops back to a state that accepts a new request.
#[derive(Debug, Default)]
pub struct DeletionFlow {
    state: DeletionState,
}

impl DeletionFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DeletionState {
        &self.state
    }

    fn invalid(&self, action: &'static str) -> FlowError {
        FlowError::InvalidTransition {
            action,
            state: self.state.clone(),
        }
    }

    pub fn request(&mut self) -> Result<(), FlowError> {
        match self.state {
            DeletionState::Idle | DeletionState::Failed(_) => {
                self.state = DeletionState::Confirming;
                Ok(())
            }
            _ => Err(self.invalid("request deletion")),
        }
    }

    pub fn cancel(&mut self) -> Result<(), FlowError> {
        match self.state {
            DeletionState::Confirming => {
                self.state = DeletionState::Idle;
                Ok(())
            }
            _ => Err(self.invalid("cancel")),
        }
    }

    pub fn confirm(&mut self) -> Result<(), FlowError> {
        match self.state {
            DeletionState::Confirming => {
                self.state = DeletionState::Deleting;
                Ok(())
            }
            _ => Err(self.invalid("confirm")),
        }
    }

    pub fn complete(&mut self, outcome: &DeletionOutcome) -> Result<(), FlowError> {
        if self.state != DeletionState::Deleting {
            return Err(self.invalid("complete"));
        }
        self.state = if outcome.success {
            DeletionState::Done
        } else {
            let message = outcome
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "account deletion failed".to_string());
            DeletionState::Failed(message)
        };
        Ok(())
    }
}
