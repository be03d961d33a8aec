//! Bounded retry with exponential backoff.
//!
//! The same policy type drives both the per-part retries and the
//! whole-operation attempt loop; only the configured budget differs.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Classifies an error as worth retrying or not.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// The last failure of a retried operation, annotated with attempt count.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryError<E: std::error::Error + 'static> {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub source: E,
}

/// Retry budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Upper bound on extra attempts beyond the first.
    pub const MAX_RETRIES: u32 = 5;

    /// Creates a policy. `max_retries` is clamped to [`Self::MAX_RETRIES`].
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.min(Self::MAX_RETRIES),
            base_delay,
            max_delay,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before retry number `retry` (0-based): `min(base * 2^retry, max)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or the
    /// budget is spent. `f` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::error::Error + 'static,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let retry = attempt - 1;
                    if !e.is_retryable() || retry >= self.max_retries {
                        return Err(RetryError {
                            operation: operation.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let delay = self.delay_for_retry(retry);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
