//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of an order fulfillment saga.
///
/// State transitions:
/// ```text
/// Init ──► Reserved ──► Paid ──► Notified ──► Finalized ──► Committed
///   │         │          │         │
///   │         └──────────┴─────────┴──► Compensating ──┬──► Compensated
///   │                                                  └──► CompensationFailed
///   └──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    /// Saga recorded, no step has succeeded yet.
    #[default]
    Init,

    /// The order was placed: cart lines moved into the order journal.
    Reserved,

    /// Payment succeeded.
    Paid,

    /// The confirmation was sent.
    Notified,

    /// Stock was decremented; the saga is about to be committed.
    Finalized,

    /// Every step applied (terminal, success).
    Committed,

    /// A step failed and the placed order is being rolled back.
    Compensating,

    /// The placed order was rolled back (terminal, failure reported).
    Compensated,

    /// Rolling back the placed order failed; ledger state needs manual
    /// reconciliation (terminal, fatal).
    CompensationFailed,

    /// The order could not be placed; nothing to undo (terminal).
    Aborted,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Committed
                | SagaState::Compensated
                | SagaState::CompensationFailed
                | SagaState::Aborted
        )
    }

    /// Returns true if the saga ended with every step applied.
    pub fn is_success(&self) -> bool {
        matches!(self, SagaState::Committed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Init => "INIT",
            SagaState::Reserved => "RESERVED",
            SagaState::Paid => "PAID",
            SagaState::Notified => "NOTIFIED",
            SagaState::Finalized => "FINALIZED",
            SagaState::Committed => "COMMITTED",
            SagaState::Compensating => "COMPENSATING",
            SagaState::Compensated => "COMPENSATED",
            SagaState::CompensationFailed => "COMPENSATION_FAILED",
            SagaState::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_init() {
        assert_eq!(SagaState::default(), SagaState::Init);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::Init.is_terminal());
        assert!(!SagaState::Reserved.is_terminal());
        assert!(!SagaState::Compensating.is_terminal());
        assert!(SagaState::Committed.is_terminal());
        assert!(SagaState::Compensated.is_terminal());
        assert!(SagaState::CompensationFailed.is_terminal());
        assert!(SagaState::Aborted.is_terminal());
    }

    #[test]
    fn test_finalized_is_not_terminal() {
        assert!(!SagaState::Finalized.is_terminal());
        assert!(!SagaState::Finalized.is_success());
        assert_eq!(SagaState::Finalized.to_string(), "FINALIZED");
    }

    #[test]
    fn test_serialization_matches_display() {
        let json = serde_json::to_string(&SagaState::CompensationFailed).unwrap();
        assert_eq!(json, "\"COMPENSATION_FAILED\"");
        let state: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.to_string(), "COMPENSATION_FAILED");
    }
}
