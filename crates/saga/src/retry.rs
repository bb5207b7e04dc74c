//! Bounded retry with exponential backoff for step-client calls.

use std::future::Future;
use std::time::Duration;

use crate::clients::StepError;

/// Retry policy for a class of step-client calls.
///
/// Transient failures are retried up to `max_attempts` total attempts,
/// sleeping `base_delay * 2^n` between attempts, capped at `max_delay`.
/// Rejections are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Default policy for forward actions.
    pub fn forward_default() -> Self {
        Self::new(3, Duration::from_millis(50), Duration::from_secs(1))
    }

    /// Default policy for compensating actions. Larger attempt budget:
    /// giving up on a compensation is the worst outcome in the system.
    pub fn compensation_default() -> Self {
        Self::new(5, Duration::from_millis(50), Duration::from_secs(2))
    }

    /// Returns the delay to sleep after the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Runs `op` under this policy, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err @ StepError::Rejected(_)) => return Err(err),
                Err(err @ StepError::Transient(_)) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, error = %err, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
