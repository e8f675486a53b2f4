//! Saga coordinator for the order fulfillment saga.

use std::time::Instant;

use common::{IdempotencyKey, OrderPayload, SagaId};
use saga_log::{AppendOptions, LogEntry, SagaLog};
use tracing::{error, info, warn};

use crate::aggregate::SagaInstance;
use crate::error::{Result, SagaError};
use crate::events::SagaEvent;
use crate::order_fulfillment::{SAGA_TYPE, STEP_COMPENSATE_PLACE_ORDER, SUCCESS_MESSAGE, Step};
use crate::retry::RetryPolicy;
use crate::services::{FinalizationService, NotificationService, PaymentService, ReservationService};
use crate::state::SagaState;

/// How a saga ended, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaOutcome {
    pub saga_id: SagaId,
    pub state: SagaState,
    pub failed_step: Option<Step>,
    pub error: Option<String>,
    pub compensation_error: Option<String>,
}

impl SagaOutcome {
    fn from_saga(saga_id: SagaId, saga: &SagaInstance) -> Self {
        Self {
            saga_id,
            state: saga.state(),
            failed_step: saga.failed_step(),
            error: saga.failure_reason().map(str::to_string),
            compensation_error: saga.compensation_error().map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }

    /// Returns the client-facing message: the confirmation on success,
    /// otherwise the failure message of the step that failed.
    pub fn message(&self) -> &'static str {
        if self.is_success() {
            return SUCCESS_MESSAGE;
        }
        self.failed_step
            .map(|step| step.failure_message())
            .unwrap_or("Order confirmation failed")
    }
}

/// Orchestrates order fulfillment sagas.
///
/// The coordinator drives place → pay → notify → finalize and rolls the
/// placed order back when a later step fails. Every transition is written
/// to the saga log before the next downstream call, so sagas interrupted by
/// a crash are picked up by [`recover`](Self::recover).
pub struct SagaCoordinator<G, R, P, N, F>
where
    G: SagaLog,
    R: ReservationService,
    P: PaymentService,
    N: NotificationService,
    F: FinalizationService,
{
    log: G,
    reservation: R,
    payment: P,
    notification: N,
    finalization: F,
    retry: RetryPolicy,
}

impl<G, R, P, N, F> SagaCoordinator<G, R, P, N, F>
where
    G: SagaLog,
    R: ReservationService,
    P: PaymentService,
    N: NotificationService,
    F: FinalizationService,
{
    pub fn new(log: G, reservation: R, payment: P, notification: N, finalization: F) -> Self {
        Self {
            log,
            reservation,
            payment,
            notification,
            finalization,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Runs the saga for an order and returns how it ended.
    ///
    /// An invalid payload is rejected before anything is logged or called.
    /// Step failures are not errors: they are reported in the outcome. An
    /// `Err` means the saga log could not be written; the saga is then left
    /// open for recovery.
    #[tracing::instrument(
        skip(self, order),
        fields(saga_type = SAGA_TYPE, user_id = %order.user_id, saga_id = tracing::field::Empty)
    )]
    pub async fn confirm_order(&self, order: OrderPayload) -> Result<SagaOutcome> {
        order.validate()?;

        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let saga_id = SagaId::new();
        tracing::Span::current().record("saga_id", tracing::field::display(saga_id));
        let order = order.with_saga(saga_id);

        let mut saga = SagaInstance::default();
        self.record(
            saga_id,
            &mut saga,
            SagaEvent::saga_started(saga_id, SAGA_TYPE, order.clone()),
        )
        .await?;

        let outcome = self.run_steps(saga_id, &mut saga, &order).await;
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        outcome
    }

    async fn run_steps(
        &self,
        saga_id: SagaId,
        saga: &mut SagaInstance,
        order: &OrderPayload,
    ) -> Result<SagaOutcome> {
        for step in Step::ALL {
            let key = IdempotencyKey::for_step(saga_id, step.name());
            self.record(saga_id, saga, SagaEvent::step_started(step.name(), key.clone()))
                .await?;
            info!(%step, "saga step started");

            match self.call_step(step, order, &key).await {
                Ok(()) => {
                    self.record(saga_id, saga, SagaEvent::step_completed(step.name()))
                        .await?;
                }
                Err(err) => {
                    let in_doubt = err.is_retryable();
                    warn!(%step, error = %err, in_doubt, "saga step failed");
                    self.record(
                        saga_id,
                        saga,
                        SagaEvent::step_failed(step.name(), err.to_string(), in_doubt),
                    )
                    .await?;
                    return self.fail(saga_id, saga, order).await;
                }
            }
        }

        self.complete(saga_id, saga).await
    }

    async fn call_step(&self, step: Step, order: &OrderPayload, key: &IdempotencyKey) -> Result<()> {
        let name = step.name();
        match step {
            Step::PlaceOrder => self.retry.run(name, || self.reservation.place(order, key)).await,
            Step::ProcessPayment => self.retry.run(name, || self.payment.pay(order, key)).await,
            Step::SendNotification => {
                self.retry
                    .run(name, || self.notification.notify(order, key))
                    .await
            }
            Step::FinalizeOrder => {
                self.retry
                    .run(name, || self.finalization.finalize(order, key))
                    .await
            }
        }
    }

    async fn complete(&self, saga_id: SagaId, saga: &mut SagaInstance) -> Result<SagaOutcome> {
        self.record(saga_id, saga, SagaEvent::saga_completed()).await?;
        metrics::counter!("saga_completed").increment(1);
        info!(%saga_id, "saga completed successfully");
        Ok(SagaOutcome::from_saga(saga_id, saga))
    }

    /// Ends a saga whose forward step failed. A place that definitely did
    /// not apply leaves nothing to undo; anything else is compensated.
    async fn fail(
        &self,
        saga_id: SagaId,
        saga: &mut SagaInstance,
        order: &OrderPayload,
    ) -> Result<SagaOutcome> {
        if saga.failed_step() == Some(Step::PlaceOrder) && !saga.failure_in_doubt() {
            let reason = saga.failure_reason().unwrap_or("unknown").to_string();
            self.record(saga_id, saga, SagaEvent::saga_aborted(reason.clone()))
                .await?;
            metrics::counter!("saga_aborted").increment(1);
            warn!(%saga_id, %reason, "saga aborted");
            return Ok(SagaOutcome::from_saga(saga_id, saga));
        }

        self.compensate(saga_id, saga, order).await
    }

    /// Rolls back the placed order. The compensation is idempotent and
    /// scoped to this saga, so it is safe when place never applied.
    #[tracing::instrument(skip(self, saga, order))]
    async fn compensate(
        &self,
        saga_id: SagaId,
        saga: &mut SagaInstance,
        order: &OrderPayload,
    ) -> Result<SagaOutcome> {
        if saga.state() != SagaState::Compensating {
            let from = saga.failed_step().map_or("none", |step| step.name());
            self.record(saga_id, saga, SagaEvent::compensation_started(from))
                .await?;
        }

        let key = IdempotencyKey::for_step(saga_id, STEP_COMPENSATE_PLACE_ORDER);
        let result = self
            .retry
            .run(STEP_COMPENSATE_PLACE_ORDER, || {
                self.reservation.compensate_place(order, &key)
            })
            .await;

        match result {
            Ok(()) => {
                self.record(
                    saga_id,
                    saga,
                    SagaEvent::compensation_step_completed(STEP_COMPENSATE_PLACE_ORDER),
                )
                .await?;
                let reason = saga.failure_reason().unwrap_or("interrupted").to_string();
                self.record(saga_id, saga, SagaEvent::saga_compensated(reason.clone()))
                    .await?;
                metrics::counter!("saga_compensated").increment(1);
                warn!(%saga_id, %reason, "saga compensated");
            }
            Err(err) => {
                error!(
                    %saga_id,
                    user_id = %order.user_id,
                    error = %err,
                    "compensation failed, ledger needs manual reconciliation"
                );
                self.record(
                    saga_id,
                    saga,
                    SagaEvent::compensation_step_failed(STEP_COMPENSATE_PLACE_ORDER, err.to_string()),
                )
                .await?;
                self.record(saga_id, saga, SagaEvent::saga_compensation_failed(err.to_string()))
                    .await?;
                metrics::counter!("saga_compensation_failed").increment(1);
            }
        }

        Ok(SagaOutcome::from_saga(saga_id, saga))
    }

    /// Loads a saga instance by ID from the saga log.
    pub async fn get_saga(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        let entries = self.log.entries_for(saga_id).await?;
        SagaInstance::replay(&entries)
    }

    /// Drives every saga without a terminal entry to a terminal state.
    ///
    /// A finalize that was in flight is re-sent with its original key and
    /// commits the saga if it succeeds; every other open saga is
    /// compensated. A saga that cannot be recovered is logged and skipped.
    pub async fn recover(&self) -> Result<Vec<SagaOutcome>> {
        let open = self.log.open_sagas().await?;
        if !open.is_empty() {
            info!(count = open.len(), "recovering open sagas");
        }

        let mut outcomes = Vec::with_capacity(open.len());
        for saga_id in open {
            match self.recover_saga(saga_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(%saga_id, error = %err, "saga recovery failed"),
            }
        }
        Ok(outcomes)
    }

    #[tracing::instrument(skip(self))]
    async fn recover_saga(&self, saga_id: SagaId) -> Result<SagaOutcome> {
        let mut saga = self
            .get_saga(saga_id)
            .await?
            .ok_or(SagaError::SagaNotFound(saga_id))?;
        let order = saga
            .order()
            .cloned()
            .ok_or_else(|| SagaError::InvalidState {
                expected: "a started saga".to_string(),
                actual: saga.state(),
            })?;
        let saga = &mut saga;

        if saga.state().is_terminal() {
            return Ok(SagaOutcome::from_saga(saga_id, saga));
        }
        if saga.state() == SagaState::Compensating {
            return self.compensate(saga_id, saga, &order).await;
        }
        if saga.has_completed(Step::FinalizeOrder) {
            return self.complete(saga_id, saga).await;
        }

        let in_flight = saga
            .in_flight()
            .map(|(step, key)| (step.to_string(), key.clone()));
        if let Some((step_name, key)) = in_flight {
            if step_name == Step::FinalizeOrder.name() {
                info!(%saga_id, "re-driving interrupted finalize");
                return match self.call_step(Step::FinalizeOrder, &order, &key).await {
                    Ok(()) => {
                        self.record(saga_id, saga, SagaEvent::step_completed(step_name))
                            .await?;
                        self.complete(saga_id, saga).await
                    }
                    Err(err) => {
                        let in_doubt = err.is_retryable();
                        self.record(
                            saga_id,
                            saga,
                            SagaEvent::step_failed(step_name, err.to_string(), in_doubt),
                        )
                        .await?;
                        self.fail(saga_id, saga, &order).await
                    }
                };
            }

            self.record(
                saga_id,
                saga,
                SagaEvent::step_failed(step_name, "interrupted before the step answered", true),
            )
            .await?;
        }

        if saga.failed_step().is_some() {
            return self.fail(saga_id, saga, &order).await;
        }
        self.compensate(saga_id, saga, &order).await
    }

    /// Appends one event at the saga's next version and applies it.
    async fn record(
        &self,
        saga_id: SagaId,
        saga: &mut SagaInstance,
        event: SagaEvent,
    ) -> Result<()> {
        let expected = saga.version();
        let entry = LogEntry::builder()
            .saga_id(saga_id)
            .version(expected.next())
            .event_type(event.event_type())
            .terminal(event.is_terminal())
            .payload(&event)?
            .build()?;

        let version = self
            .log
            .append(vec![entry], AppendOptions::expect_version(expected))
            .await?;
        saga.apply(event);
        saga.set_version(version);
        Ok(())
    }
}
