//! Service traits for saga steps, with in-process, in-memory and HTTP
//! implementations.
//!
//! Every request carries the idempotency key of its saga step so that a
//! retried or re-driven call is applied at most once.

pub mod finalization;
pub mod http;
pub mod notification;
pub mod payment;
pub mod reservation;

pub use finalization::{FinalizationService, InMemoryFinalizationService};
pub use http::{
    HttpClient, HttpFinalizationService, HttpNotificationService, HttpPaymentService,
    HttpReservationService,
};
pub use notification::{
    ConfirmationEmail, InMemoryNotificationService, NotificationService, render_confirmation,
};
pub use payment::{InMemoryPaymentService, PaymentService};
pub use reservation::{InMemoryReservationService, ReservationService};

use crate::error::SagaError;

/// How an in-memory service double misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Calls succeed.
    #[default]
    None,
    /// Calls fail with a business rejection.
    Reject,
    /// Calls fail as if the service could not be reached.
    Unavailable,
    /// Calls never return.
    Hang,
}

/// A failure mode that applies to the next `remaining` calls, or to every
/// call when `remaining` is None.
#[derive(Debug, Default)]
pub(crate) struct Fault {
    mode: FailureMode,
    remaining: Option<u32>,
}

impl Fault {
    pub(crate) fn set(&mut self, mode: FailureMode, times: Option<u32>) {
        self.mode = mode;
        self.remaining = times;
    }

    /// Returns the failure mode for the current call.
    pub(crate) fn next(&mut self) -> FailureMode {
        match self.remaining {
            Some(0) => FailureMode::None,
            Some(n) => {
                self.remaining = Some(n - 1);
                self.mode
            }
            None => self.mode,
        }
    }
}

/// Turns a failure mode into the outcome of a service call.
pub(crate) async fn inject(mode: FailureMode, step: &str) -> Result<(), SagaError> {
    match mode {
        FailureMode::None => Ok(()),
        FailureMode::Reject => Err(SagaError::Rejected {
            step: step.to_string(),
            status: 500,
            message: format!("{step} rejected"),
        }),
        FailureMode::Unavailable => Err(SagaError::DownstreamUnavailable {
            step: step.to_string(),
            reason: "connection refused".to_string(),
        }),
        FailureMode::Hang => std::future::pending().await,
    }
}
