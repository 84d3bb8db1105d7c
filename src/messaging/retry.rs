//! Bounded retry with exponential backoff for provider calls.
//!
//! An operation gets `max_retries + 1` attempts. Only retryable provider
//! failures (429, 500, 502, 503, 504) are retried; anything else returns at
//! once. Both the provider call and the backoff wait race the caller's
//! [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::telemetry::{Telemetry, TelemetryEvent};
use super::MessagingError;
use crate::providers::ProviderError;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay, including provider hints.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Short delays for tests and local runs.
    pub fn fast() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
        }
    }

    /// Exponential delay after the zero-based `attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait before retrying `error`. A 429 hint replaces the computed
    /// backoff but is still capped.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(self.max_delay),
            None => self.backoff(attempt),
        }
    }
}

/// Executes provider calls under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryEngine {
    policy: RetryPolicy,
    telemetry: Arc<dyn Telemetry>,
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryEngine {
    /// Engine reporting to `telemetry`.
    pub fn new(policy: RetryPolicy, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { policy, telemetry }
    }

    /// The policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Provider`] with the non-retryable error, or the
    ///   last retryable error once attempts are exhausted
    /// - [`MessagingError::Cancelled`] if `cancel` fires during a call or wait
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, MessagingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(MessagingError::Cancelled),
                outcome = op() => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    self.telemetry.record(TelemetryEvent::ProviderAttempt {
                        attempt,
                        succeeded: true,
                    });
                    return Ok(value);
                }
                Err(error) => error,
            };
            self.telemetry.record(TelemetryEvent::ProviderAttempt {
                attempt,
                succeeded: false,
            });

            if !error.is_retryable() {
                return Err(MessagingError::Provider(error));
            }
            if attempt == self.policy.max_retries {
                last_error = Some(error);
                break;
            }

            let delay = self.policy.delay_for(attempt, &error);
            self.telemetry.record(TelemetryEvent::RetryScheduled {
                attempt,
                delay,
                code: error.code(),
            });
            last_error = Some(error);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(MessagingError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }

        Err(last_error.map_or(MessagingError::RetriesExhausted, MessagingError::Provider))
    }
}
