//! Exponential backoff for transient coordination errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::CoordinationResult;

/// Upper bound on retry attempts and on the backoff exponent.
const MAX_RETRIES_LIMIT: u32 = 29;

/// Retry policy configuration for transient coordination errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Base delay between retries (actual delay uses exponential backoff).
    pub base_delay: Duration,
    /// Cap on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES_LIMIT,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl From<&config::RetryConfig> for RetryPolicy {
    fn from(cfg: &config::RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries.min(MAX_RETRIES_LIMIT),
            base_delay: cfg.base_delay,
            max_delay: cfg.max_delay,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(MAX_RETRIES_LIMIT)))
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` retries have been spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> CoordinationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoordinationResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    warn!(
                        what,
                        attempt,
                        retry_in_ms = delay.as_millis(),
                        error = %err,
                        "transient coordination error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
