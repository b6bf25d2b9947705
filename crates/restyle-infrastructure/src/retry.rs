//! Bounded retry with exponential backoff for provider calls.

use restyle_core::error::{RestyleError, Result};
use std::future::Future;
use std::time::Duration;

/// Retry budget shared by both provider adapters: up to three attempts,
/// with 2s/4s/8s delays after each failed attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }

    /// Delay applied after the given 1-based attempt fails: base doubled on
    /// every attempt (2s, 4s, 8s with the defaults).
    fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Runs `op` until it succeeds, fails non-retryably, or the attempt budget
/// is exhausted.
///
/// Only errors whose [`RestyleError::is_retryable`] is true are retried;
/// auth/config/request-shape failures surface immediately. The closure
/// receives the 1-based attempt number for logging.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = RestyleError::internal(format!("{op_name}: no attempts made"));
    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                let delay = policy.backoff_after(attempt);
                tracing::warn!(
                    "[Retry] {} failed (attempt {}/{}): {}, retrying in {:?}",
                    op_name,
                    attempt,
                    policy.max_attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                last_err = err;
            }
            Err(err) => {
                tracing::error!(
                    "[Retry] {} failed with non-retryable error: {}",
                    op_name,
                    err
                );
                return Err(err);
            }
        }
    }
    tracing::error!(
        "[Retry] {} exhausted {} attempts: {}",
        op_name,
        policy.max_attempts,
        last_err
    );
    Err(last_err)
}
