//! Retry logic with exponential backoff for transient API errors.

use crate::cancel::CancelToken;
use crate::error::Result;
use std::time::Duration;

/// Configuration for request retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryConfig {
    /// Build a config from the provider's min/max retry delays.
    pub fn from_delays(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay: min_delay,
            max_delay: max_delay.max(min_delay),
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Execute an operation, retrying retryable errors with exponential backoff.
///
/// The backoff sleep honors `cancel`; a cancellation during the wait returns
/// the cancellation error instead of the last failure.
pub fn with_retry<T, F>(config: &RetryConfig, cancel: &CancelToken, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        cancel.check()?;
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() || attempt + 1 >= config.max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                log::debug!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay
                );
                cancel.sleep(delay)?;
                attempt += 1;
            }
        }
    }
}
