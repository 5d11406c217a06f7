//! Coordinator error types

use contracts::{AlertOutcome, OperationId, Rejection};
use thiserror::Error;

/// Alert intent that did not end in a delivery
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Pre-flight refused to start a countdown
    #[error("alert rejected: {0}")]
    Rejected(Rejection),

    /// Dispatch was attempted and failed
    #[error("alert {operation_id} failed: {message}")]
    DispatchFailed {
        operation_id: OperationId,
        message: String,
    },
}

/// Delivered alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub operation_id: OperationId,
    pub sent_to: usize,
    /// Per-contact failures reported alongside the delivery
    pub errors: Vec<String>,
}

impl TryFrom<AlertOutcome> for Delivery {
    type Error = CoordinatorError;

    fn try_from(outcome: AlertOutcome) -> Result<Self, Self::Error> {
        match outcome {
            AlertOutcome::Delivered {
                operation_id,
                sent_to,
                errors,
            } => Ok(Delivery {
                operation_id,
                sent_to,
                errors,
            }),
            AlertOutcome::Rejected(rejection) => Err(CoordinatorError::Rejected(rejection)),
            AlertOutcome::Failed {
                operation_id,
                message,
            } => Err(CoordinatorError::DispatchFailed {
                operation_id,
                message,
            }),
        }
    }
}
