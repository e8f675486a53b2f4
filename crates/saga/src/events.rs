//! Saga events, as persisted in the saga log.

use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderPayload, SagaId};
use serde::{Deserialize, Serialize};

/// Events that can occur during saga execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// A step is about to call its service. Logged before the call.
    StepStarted(StepStartedData),

    /// A step completed successfully.
    StepCompleted(StepData),

    /// A step failed.
    StepFailed(StepFailedData),

    /// Compensation started after a step failure.
    CompensationStarted(CompensationData),

    /// A compensation step completed successfully.
    CompensationStepCompleted(StepData),

    /// A compensation step failed.
    CompensationStepFailed(StepFailedData),

    /// Every step succeeded.
    SagaCompleted(SagaEndedData),

    /// The saga failed and its placed order was rolled back.
    SagaCompensated(SagaEndedData),

    /// The saga failed and rolling back its placed order failed too.
    SagaCompensationFailed(SagaEndedData),

    /// The saga failed before anything durable happened.
    SagaAborted(SagaEndedData),
}

impl SagaEvent {
    /// Returns the event name stored alongside the payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepStarted(_) => "StepStarted",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::CompensationStepFailed(_) => "CompensationStepFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaCompensated(_) => "SagaCompensated",
            SagaEvent::SagaCompensationFailed(_) => "SagaCompensationFailed",
            SagaEvent::SagaAborted(_) => "SagaAborted",
        }
    }

    /// Returns true if the event ends the saga.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaEvent::SagaCompleted(_)
                | SagaEvent::SagaCompensated(_)
                | SagaEvent::SagaCompensationFailed(_)
                | SagaEvent::SagaAborted(_)
        )
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: SagaId,
    /// The type of saga (e.g., "OrderFulfillment").
    pub saga_type: String,
    /// The order being fulfilled, tagged with the saga id.
    pub order: OrderPayload,
    pub started_at: DateTime<Utc>,
}

/// Data for StepStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepStartedData {
    pub step_name: String,
    /// Key sent with the request, so a re-drive after a crash reuses it.
    pub idempotency_key: IdempotencyKey,
}

/// Data for step completion events (just the step name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepData {
    pub step_name: String,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailedData {
    pub step_name: String,
    pub error: String,
    /// True if the request may still have been applied downstream
    /// (timeout or transport failure).
    #[serde(default)]
    pub in_doubt: bool,
}

/// Data for CompensationStarted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationData {
    /// The step that triggered compensation.
    pub from_step: String,
}

/// Data for the terminal events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEndedData {
    pub reason: Option<String>,
    pub ended_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(saga_id: SagaId, saga_type: impl Into<String>, order: OrderPayload) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            saga_type: saga_type.into(),
            order,
            started_at: Utc::now(),
        })
    }

    pub fn step_started(step_name: impl Into<String>, idempotency_key: IdempotencyKey) -> Self {
        SagaEvent::StepStarted(StepStartedData {
            step_name: step_name.into(),
            idempotency_key,
        })
    }

    pub fn step_completed(step_name: impl Into<String>) -> Self {
        SagaEvent::StepCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn step_failed(step_name: impl Into<String>, error: impl Into<String>, in_doubt: bool) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
            in_doubt,
        })
    }

    pub fn compensation_started(from_step: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData {
            from_step: from_step.into(),
        })
    }

    pub fn compensation_step_completed(step_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn compensation_step_failed(step_name: impl Into<String>, error: impl Into<String>) -> Self {
        SagaEvent::CompensationStepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
            in_doubt: false,
        })
    }

    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaEndedData {
            reason: None,
            ended_at: Utc::now(),
        })
    }

    pub fn saga_compensated(reason: impl Into<String>) -> Self {
        SagaEvent::SagaCompensated(SagaEndedData {
            reason: Some(reason.into()),
            ended_at: Utc::now(),
        })
    }

    pub fn saga_compensation_failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaCompensationFailed(SagaEndedData {
            reason: Some(reason.into()),
            ended_at: Utc::now(),
        })
    }

    pub fn saga_aborted(reason: impl Into<String>) -> Self {
        SagaEvent::SagaAborted(SagaEndedData {
            reason: Some(reason.into()),
            ended_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use common::CartItem;

    use super::*;

    fn order() -> OrderPayload {
        OrderPayload::new(1, "a@b.c", vec![CartItem::new(1, 2)])
    }

    #[test]
    fn test_only_end_events_are_terminal() {
        let saga_id = SagaId::new();
        assert!(!SagaEvent::saga_started(saga_id, "OrderFulfillment", order()).is_terminal());
        assert!(!SagaEvent::step_failed("place_order", "boom", false).is_terminal());
        assert!(!SagaEvent::compensation_started("process_payment").is_terminal());
        assert!(SagaEvent::saga_completed().is_terminal());
        assert!(SagaEvent::saga_compensated("x").is_terminal());
        assert!(SagaEvent::saga_compensation_failed("x").is_terminal());
        assert!(SagaEvent::saga_aborted("x").is_terminal());
    }

    #[test]
    fn test_saga_started_keeps_the_order() {
        let saga_id = SagaId::new();
        let event = SagaEvent::saga_started(saga_id, "OrderFulfillment", order().with_saga(saga_id));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SagaStarted");

        let deserialized: SagaEvent = serde_json::from_value(json).unwrap();
        if let SagaEvent::SagaStarted(data) = deserialized {
            assert_eq!(data.saga_id, saga_id);
            assert_eq!(data.order.saga_id, Some(saga_id));
            assert_eq!(data.order.cart, vec![CartItem::new(1, 2)]);
        } else {
            panic!("Expected SagaStarted event");
        }
    }

    #[test]
    fn test_step_started_keeps_the_key() {
        let key = IdempotencyKey::new("s:finalize_order");
        let event = SagaEvent::step_started("finalize_order", key.clone());
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: SagaEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.event_type(), "StepStarted");
        if let SagaEvent::StepStarted(data) = deserialized {
            assert_eq!(data.idempotency_key, key);
        } else {
            panic!("Expected StepStarted event");
        }
    }
}
