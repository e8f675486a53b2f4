//! Saga instance rebuilt from the saga log.

use common::{IdempotencyKey, OrderPayload, SagaId};
use saga_log::{LogEntry, Version};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::order_fulfillment::Step;
use crate::state::SagaState;

/// An event-sourced saga instance.
///
/// Tracks the order being fulfilled, which steps completed, which step was
/// in flight when the log ends, and why the saga failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<SagaId>,
    version: Version,
    saga_type: String,
    order: Option<OrderPayload>,
    state: SagaState,
    completed_steps: Vec<String>,
    /// Step whose StepStarted has no matching completion or failure.
    in_flight: Option<(String, IdempotencyKey)>,
    failed_step: Option<String>,
    failure_in_doubt: bool,
    failure_reason: Option<String>,
    compensation_error: Option<String>,
}

impl SagaInstance {
    /// Rebuilds a saga from its log entries. Returns None for an empty log.
    pub fn replay(entries: &[LogEntry]) -> Result<Option<Self>, SagaError> {
        if entries.is_empty() {
            return Ok(None);
        }

        let mut saga = SagaInstance::default();
        for entry in entries {
            let event: SagaEvent = entry.decode()?;
            saga.apply(event);
            saga.set_version(entry.version);
        }
        Ok(Some(saga))
    }

    pub fn apply(&mut self, event: SagaEvent) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.saga_type = data.saga_type;
                self.order = Some(data.order);
                self.state = SagaState::Init;
            }
            SagaEvent::StepStarted(data) => {
                self.in_flight = Some((data.step_name, data.idempotency_key));
            }
            SagaEvent::StepCompleted(data) => {
                self.in_flight = None;
                if let Some(step) = Step::from_name(&data.step_name) {
                    self.state = step.state_after();
                }
                self.completed_steps.push(data.step_name);
            }
            SagaEvent::StepFailed(data) => {
                self.in_flight = None;
                self.failed_step = Some(data.step_name);
                self.failure_in_doubt = data.in_doubt;
                self.failure_reason = Some(data.error);
            }
            SagaEvent::CompensationStarted(_) => {
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationStepCompleted(_) => {}
            SagaEvent::CompensationStepFailed(data) => {
                self.compensation_error = Some(data.error);
            }
            SagaEvent::SagaCompleted(_) => {
                self.state = SagaState::Committed;
            }
            SagaEvent::SagaCompensated(data) => {
                self.state = SagaState::Compensated;
                if self.failure_reason.is_none() {
                    self.failure_reason = data.reason;
                }
            }
            SagaEvent::SagaCompensationFailed(data) => {
                self.state = SagaState::CompensationFailed;
                if self.compensation_error.is_none() {
                    self.compensation_error = data.reason;
                }
            }
            SagaEvent::SagaAborted(data) => {
                self.state = SagaState::Aborted;
                if self.failure_reason.is_none() {
                    self.failure_reason = data.reason;
                }
            }
        }
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl SagaInstance {
    pub fn id(&self) -> Option<SagaId> {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the order this saga fulfills.
    pub fn order(&self) -> Option<&OrderPayload> {
        self.order.as_ref()
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn has_completed(&self, step: Step) -> bool {
        self.completed_steps.iter().any(|s| s == step.name())
    }

    /// Returns the step started but never resolved, with the key it was
    /// sent with.
    pub fn in_flight(&self) -> Option<(&str, &IdempotencyKey)> {
        self.in_flight
            .as_ref()
            .map(|(step, key)| (step.as_str(), key))
    }

    /// Returns the forward step that failed, if any.
    pub fn failed_step(&self) -> Option<Step> {
        self.failed_step.as_deref().and_then(Step::from_name)
    }

    /// Returns true if the failed step may have been applied anyway.
    pub fn failure_in_doubt(&self) -> bool {
        self.failure_in_doubt
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn compensation_error(&self) -> Option<&str> {
        self.compensation_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use common::CartItem;

    use super::*;
    use crate::order_fulfillment::{SAGA_TYPE, STEP_COMPENSATE_PLACE_ORDER};

    fn started() -> (SagaId, SagaInstance) {
        let saga_id = SagaId::new();
        let order = OrderPayload::new(1, "a@b.c", vec![CartItem::new(1, 2)]).with_saga(saga_id);
        let mut saga = SagaInstance::default();
        saga.apply(SagaEvent::saga_started(saga_id, SAGA_TYPE, order));
        (saga_id, saga)
    }

    fn run_step(saga: &mut SagaInstance, saga_id: SagaId, step: Step) {
        saga.apply(SagaEvent::step_started(
            step.name(),
            IdempotencyKey::for_step(saga_id, step.name()),
        ));
        saga.apply(SagaEvent::step_completed(step.name()));
    }

    #[test]
    fn test_default_saga_instance() {
        let saga = SagaInstance::default();
        assert!(saga.id().is_none());
        assert_eq!(saga.state(), SagaState::Init);
        assert!(saga.completed_steps().is_empty());
    }

    #[test]
    fn test_apply_saga_started() {
        let (saga_id, saga) = started();
        assert_eq!(saga.id(), Some(saga_id));
        assert_eq!(saga.saga_type(), SAGA_TYPE);
        assert_eq!(saga.order().unwrap().saga_id, Some(saga_id));
    }

    #[test]
    fn test_forward_steps_advance_state() {
        let (saga_id, mut saga) = started();

        run_step(&mut saga, saga_id, Step::PlaceOrder);
        assert_eq!(saga.state(), SagaState::Reserved);
        run_step(&mut saga, saga_id, Step::ProcessPayment);
        assert_eq!(saga.state(), SagaState::Paid);
        run_step(&mut saga, saga_id, Step::SendNotification);
        assert_eq!(saga.state(), SagaState::Notified);
        run_step(&mut saga, saga_id, Step::FinalizeOrder);
        assert_eq!(saga.state(), SagaState::Finalized);
        assert!(saga.has_completed(Step::FinalizeOrder));

        saga.apply(SagaEvent::saga_completed());
        assert_eq!(saga.state(), SagaState::Committed);
        assert!(saga.in_flight().is_none());
    }

    #[test]
    fn test_in_flight_step_is_tracked() {
        let (saga_id, mut saga) = started();
        let key = IdempotencyKey::for_step(saga_id, Step::PlaceOrder.name());
        saga.apply(SagaEvent::step_started(Step::PlaceOrder.name(), key.clone()));

        assert_eq!(saga.in_flight(), Some((Step::PlaceOrder.name(), &key)));
        assert_eq!(saga.state(), SagaState::Init);
    }

    #[test]
    fn test_failure_and_compensation() {
        let (saga_id, mut saga) = started();
        run_step(&mut saga, saga_id, Step::PlaceOrder);
        saga.apply(SagaEvent::step_failed(
            Step::ProcessPayment.name(),
            "declined",
            false,
        ));
        assert_eq!(saga.failed_step(), Some(Step::ProcessPayment));
        assert_eq!(saga.failure_reason(), Some("declined"));

        saga.apply(SagaEvent::compensation_started(Step::ProcessPayment.name()));
        assert_eq!(saga.state(), SagaState::Compensating);

        saga.apply(SagaEvent::compensation_step_failed(
            STEP_COMPENSATE_PLACE_ORDER,
            "ledger down",
        ));
        saga.apply(SagaEvent::saga_compensation_failed("ledger down"));
        assert_eq!(saga.state(), SagaState::CompensationFailed);
        assert_eq!(saga.compensation_error(), Some("ledger down"));
        assert_eq!(saga.failure_reason(), Some("declined"));
    }

    #[test]
    fn test_replay_restores_version() {
        let saga_id = SagaId::new();
        let order = OrderPayload::new(1, "a@b.c", vec![CartItem::new(1, 2)]);
        let events = [
            SagaEvent::saga_started(saga_id, SAGA_TYPE, order),
            SagaEvent::step_started("place_order", IdempotencyKey::new("k")),
            SagaEvent::step_completed("place_order"),
        ];
        let entries: Vec<LogEntry> = events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                LogEntry::builder()
                    .saga_id(saga_id)
                    .version(Version::new(i as i64 + 1))
                    .event_type(event.event_type())
                    .payload(event)
                    .unwrap()
                    .build()
                    .unwrap()
            })
            .collect();

        let saga = SagaInstance::replay(&entries).unwrap().unwrap();
        assert_eq!(saga.version(), Version::new(3));
        assert_eq!(saga.state(), SagaState::Reserved);
        assert!(SagaInstance::replay(&[]).unwrap().is_none());
    }
}
