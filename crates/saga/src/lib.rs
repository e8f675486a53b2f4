//! Orchestrator for the order fulfillment saga.
//!
//! The saga runs four steps, strictly in order:
//! 1. Place the order (cart lines move into the order journal)
//! 2. Process payment
//! 3. Send the confirmation
//! 4. Finalize the order (stock is decremented)
//!
//! If place definitely failed, the saga aborts. Any later failure, or a
//! place whose outcome is unknown, is compensated by rolling back the
//! placed order. Every transition is persisted in the saga log before the
//! next downstream call, and [`SagaCoordinator::recover`] finishes sagas
//! that were interrupted.

pub mod aggregate;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod order_fulfillment;
pub mod retry;
pub mod services;
pub mod state;

pub use aggregate::SagaInstance;
pub use coordinator::{SagaCoordinator, SagaOutcome};
pub use error::{Result, SagaError};
pub use events::SagaEvent;
pub use order_fulfillment::Step;
pub use retry::RetryPolicy;
pub use services::{
    FailureMode, FinalizationService, HttpClient, HttpFinalizationService,
    HttpNotificationService, HttpPaymentService, HttpReservationService,
    InMemoryFinalizationService, InMemoryNotificationService, InMemoryPaymentService,
    InMemoryReservationService, NotificationService, PaymentService, ReservationService,
};
pub use state::SagaState;
