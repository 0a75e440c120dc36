//! Bounded exponential backoff for transient API failures.
//!
//! Only failures classified as transient by [`ProviderError::is_transient`]
//! (429, 503, 504, request timeout) are retried. Everything else, including
//! authentication failures, is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use steward_config::HttpConfig;
use steward_core::error::ProviderError;
use tracing::{debug, warn};

/// A failed attempt, with an optional server-provided `Retry-After` hint.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub error: ProviderError,
    pub retry_after: Option<Duration>,
}

impl From<ProviderError> for AttemptFailure {
    fn from(error: ProviderError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// How many times to try and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(http: &HttpConfig) -> Self {
        Self::new(
            http.max_attempts,
            Duration::from_millis(http.base_delay_ms),
            Duration::from_millis(http.max_delay_ms),
        )
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let wanted = match retry_after {
            Some(hint) => backoff.max(hint),
            None => backoff,
        };
        wanted.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. The last error is returned
    /// when every attempt failed transiently.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) if failure.error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, failure.retry_after);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "Transient failure, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    if failure.error.is_transient() {
                        warn!(label, attempts = attempt, error = %failure.error, "Retries exhausted");
                    }
                    return Err(failure.error);
                }
            }
        }
    }
}
