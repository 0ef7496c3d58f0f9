//! Exponential backoff for rate-limited extraction calls.
//!
//! Only [`ExtractionError::RateLimited`] is retried. Every other error is
//! returned to the caller on the spot so the pass loop can decide what to do.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::llm::ExtractionError;

/// Backoff policy: wait `2^attempt * base_delay + jitter` after a rate-limited
/// attempt, for at most `max_attempts` calls in total.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(3000),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows the zero-based `attempt`, without jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Delay before the retry that follows the zero-based `attempt`.
    ///
    /// Jitter is capped at `base_delay`, so consecutive delays are strictly increasing.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.max_jitter.min(self.base_delay).as_millis() as u64;
        let jitter = if cap == 0 {
            0
        } else {
            rand::rng().random_range(0..cap)
        };
        self.base_backoff(attempt) + Duration::from_millis(jitter)
    }
}

/// Runs `operation` until it succeeds, fails with a non rate-limit error, or
/// the policy runs out of attempts.
///
/// # Arguments
///
/// * `policy` - The backoff policy.
/// * `operation` - Called with the zero-based attempt number.
/// * `on_backoff` - Called with the attempt number and the delay before each sleep.
///
/// # Returns
///
/// The first successful value, or the last error.
pub async fn with_retry<T, F, Fut, B>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_backoff: B,
) -> Result<T, ExtractionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExtractionError>>,
    B: FnMut(u32, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limited() && attempt + 1 < max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "Rate limit hit at attempt {}. Backing off for {}ms",
                    attempt + 1,
                    delay.as_millis()
                );
                on_backoff(attempt, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!("Extraction call failed at attempt {}: {}", attempt + 1, err);
                return Err(err);
            }
        }
    }
}
