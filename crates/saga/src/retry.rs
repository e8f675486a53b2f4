//! Deadline and bounded retry for downstream calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::SagaError;

/// Bounds every downstream call with a deadline and retries transport
/// failures and timeouts a fixed number of times.
///
/// Requests carry an idempotency key, so a retry of a call that was in
/// fact applied is recognised downstream and not applied again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub step_timeout: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_millis(5000),
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(step_timeout: Duration, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            step_timeout,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. An attempt that exceeds the deadline fails with
    /// [`SagaError::Timeout`].
    pub async fn run<T, F, Fut>(&self, step: &str, mut call: F) -> Result<T, SagaError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SagaError>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.step_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(SagaError::Timeout {
                    step: step.to_string(),
                    after_ms: self.step_timeout.as_millis() as u64,
                }),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    metrics::counter!("downstream_retries_total", "step" => step.to_string())
                        .increment(1);
                    warn!(step, attempt, error = %err, "downstream call failed, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(50), 3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retries_transport_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = policy()
            .run("place_order", || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SagaError::DownstreamUnavailable {
                            step: "place_order".into(),
                            reason: "connection refused".into(),
                        })
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = policy()
            .run("process_payment", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SagaError::DownstreamUnavailable {
                        step: "process_payment".into(),
                        reason: "reset".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SagaError::DownstreamUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn business_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = policy()
            .run("place_order", || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SagaError::InsufficientStock("none left".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(SagaError::InsufficientStock(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let single = RetryPolicy::new(Duration::from_millis(20), 1, Duration::ZERO);
        let result: Result<(), _> = single
            .run("send_notification", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(SagaError::Timeout { after_ms: 20, .. })
        ));
    }
}
