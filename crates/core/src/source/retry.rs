use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::BackendError;

/// Bounded retry budget for one logical backend call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts: attempts.max(1), delay }
    }

    /// One attempt, no delay.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Runs `call` until it succeeds, fails terminally, or the budget is spent.
///
/// `call` receives the 1-based attempt number. Only errors for which
/// [`BackendError::is_retryable`] holds are retried; exhausting the budget
/// yields [`BackendError::MaxRetriesExceeded`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, BackendError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let attempts = policy.attempts();

    for attempt in 1..=attempts {
        match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_retryable() => return Err(error),
            Err(error) => {
                warn!(
                    event_name = "backend.call.retryable_failure",
                    operation,
                    attempt,
                    max_attempts = attempts,
                    error = %error,
                    "backend call failed"
                );
            }
        }

        if attempt < attempts && !policy.delay().is_zero() {
            tokio::time::sleep(policy.delay()).await;
        }
    }

    Err(BackendError::MaxRetriesExceeded { attempts })
}
