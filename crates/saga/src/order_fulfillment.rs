//! Order fulfillment saga steps.

use crate::state::SagaState;

/// The saga type identifier for order fulfillment.
pub const SAGA_TYPE: &str = "OrderFulfillment";

/// Step name of the only compensation the saga issues.
pub const STEP_COMPENSATE_PLACE_ORDER: &str = "compensate_place_order";

/// Message returned to the client when every step succeeded.
pub const SUCCESS_MESSAGE: &str = "Order confirmed successfully";

/// Forward steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    PlaceOrder,
    ProcessPayment,
    SendNotification,
    FinalizeOrder,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::PlaceOrder,
        Step::ProcessPayment,
        Step::SendNotification,
        Step::FinalizeOrder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::PlaceOrder => "place_order",
            Step::ProcessPayment => "process_payment",
            Step::SendNotification => "send_notification",
            Step::FinalizeOrder => "finalize_order",
        }
    }

    pub fn from_name(name: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|step| step.name() == name)
    }

    /// Message reported to the client when this step fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Step::PlaceOrder => "Failed to place order",
            Step::ProcessPayment => "Failed to process payment",
            Step::SendNotification => "Failed to send notification",
            Step::FinalizeOrder => "Failed to remove from DB",
        }
    }

    /// State the saga enters once this step has succeeded.
    pub fn state_after(&self) -> SagaState {
        match self {
            Step::PlaceOrder => SagaState::Reserved,
            Step::ProcessPayment => SagaState::Paid,
            Step::SendNotification => SagaState::Notified,
            Step::FinalizeOrder => SagaState::Finalized,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
