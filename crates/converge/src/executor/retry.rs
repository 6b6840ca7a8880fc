//! Retry logic with exponential backoff for transient errors.

use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

/// Retry policy for command execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Default backoff with `retries` additional attempts.
    #[must_use]
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Retry without waiting between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Create a config that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `attempt` - Failed attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// Callback that logs each retry as a warning.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::warn!(
            "Attempt {attempt}/{max_attempts} failed: {error}. Retrying in {}ms...",
            delay.as_millis()
        );
    }
}

/// Execute an operation with retry logic.
///
/// Retries the operation if it returns a retryable error, using exponential
/// backoff between attempts. Non-retryable errors are returned immediately.
///
/// # Returns
/// The result of the operation, or the last error if all attempts failed.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation(attempt) {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() || attempt + 1 >= attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempt + 1, attempts, &e, delay);
                }
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig::new(5, Duration::from_secs(1), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        // capped at max_delay
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_with_retries() {
        assert_eq!(RetryConfig::with_retries(0).max_attempts, 1);
        assert_eq!(RetryConfig::with_retries(4).max_attempts, 5);
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let config = RetryConfig::no_retry();
        let result = with_retry(&config, None, |_| Ok::<_, Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let config = RetryConfig::immediate(5);
        let attempts = Cell::new(0);

        let result: Result<()> = with_retry(&config, None, |_| {
            attempts.set(attempts.get() + 1);
            Err(Error::encoding("bad json"))
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let config = RetryConfig::immediate(3);
        let result = with_retry(&config, None, |attempt| {
            if attempt < 2 {
                Err(Error::transport("timeout"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let config = RetryConfig::immediate(3);
        let attempts = Cell::new(0);

        let result: Result<()> = with_retry(&config, None, |_| {
            attempts.set(attempts.get() + 1);
            Err(Error::semantic("concurrent modification"))
        });

        assert!(matches!(result, Err(Error::Semantic { .. })));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let config = RetryConfig::immediate(0);
        let attempts = Cell::new(0);
        let _: Result<()> = with_retry(&config, None, |_| {
            attempts.set(attempts.get() + 1);
            Err(Error::transport("down"))
        });
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_callback_invoked() {
        struct CountingCallback(Arc<AtomicU32>);
        impl RetryCallback for CountingCallback {
            fn on_retry(&self, _: u32, _: u32, _: &Error, _: Duration) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let callback_count = Arc::new(AtomicU32::new(0));
        let callback = CountingCallback(callback_count.clone());

        let _: Result<()> = with_retry(&RetryConfig::immediate(3), Some(&callback), |_| {
            Err(Error::transport("timeout"))
        });

        // Called for each retry (not the first attempt, not the last)
        assert_eq!(callback_count.load(Ordering::SeqCst), 2);
    }
}
