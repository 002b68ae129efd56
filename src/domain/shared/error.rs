//! Domain errors

use thiserror::Error;

/// Errors returned synchronously by call-control operations.
///
/// Precondition violations never change the controller's state. `Transport`
/// is only returned after the controller has already failed safe to `Idle`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("A call is already in progress")]
    CallInProgress,

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Device is not registered")]
    NotReady,

    #[error("A transfer is already in progress")]
    TransferInProgress,

    #[error("No transfer in progress")]
    NoTransfer,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Call controller has stopped")]
    ControllerStopped,
}

impl DomainError {
    pub(crate) fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        DomainError::InvalidState {
            operation,
            state: state.to_string(),
        }
    }
}
