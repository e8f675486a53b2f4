//! Saga error types.

use common::{PayloadError, SagaId};
use inventory::InventoryError;
use saga_log::SagaLogError;
use thiserror::Error;

use crate::state::SagaState;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order was rejected before any downstream call.
    #[error("Invalid request payload: {0}")]
    Validation(#[from] PayloadError),

    /// Not enough stock to place or finalize the order.
    #[error("{0}")]
    InsufficientStock(String),

    /// The downstream service answered with a failure.
    #[error("Step '{step}' rejected with status {status}: {message}")]
    Rejected {
        step: String,
        status: u16,
        message: String,
    },

    /// The downstream service could not be reached.
    #[error("Step '{step}' unavailable: {reason}")]
    DownstreamUnavailable { step: String, reason: String },

    /// The downstream call did not answer within the step deadline.
    #[error("Step '{step}' timed out after {after_ms} ms")]
    Timeout { step: String, after_ms: u64 },

    /// A ledger transaction failed to begin, execute or commit.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The saga is not in a state that allows the operation.
    #[error("Invalid saga state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: SagaState },

    /// No saga with this id was ever logged.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// Saga log error.
    #[error("Saga log error: {0}")]
    SagaLog(#[from] SagaLogError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true if the failure may be transient and the request may or
    /// may not have been applied downstream. Only these are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SagaError::DownstreamUnavailable { .. } | SagaError::Timeout { .. }
        )
    }
}

impl From<InventoryError> for SagaError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Validation(e) => SagaError::Validation(e),
            e @ InventoryError::InsufficientStock { .. } => {
                SagaError::InsufficientStock(e.to_string())
            }
            e => SagaError::Transaction(e.to_string()),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(
            SagaError::Timeout {
                step: "place_order".into(),
                after_ms: 10
            }
            .is_retryable()
        );
        assert!(
            SagaError::DownstreamUnavailable {
                step: "place_order".into(),
                reason: "connection refused".into()
            }
            .is_retryable()
        );
        assert!(!SagaError::InsufficientStock("x".into()).is_retryable());
        assert!(
            !SagaError::Rejected {
                step: "process_payment".into(),
                status: 500,
                message: "declined".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn inventory_errors_map_to_saga_taxonomy() {
        let err: SagaError = InventoryError::InsufficientStock {
            product_id: ProductId::new(2),
            requested: 10,
            available: 3,
        }
        .into();
        assert!(matches!(err, SagaError::InsufficientStock(msg) if msg.contains("product ID 2")));

        let err: SagaError = InventoryError::ProductNotFound(ProductId::new(9)).into();
        assert!(matches!(err, SagaError::Transaction(_)));
    }
}
