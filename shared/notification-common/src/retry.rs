//! Retry logic and backoff strategies for notification channels
//!
//! Only idempotent vendor calls (status lookups, credential checks) go through
//! here. Sends are never retried in place.

use backoff::{backoff::Backoff, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::provider_base::ProviderError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            exponential_base: 2.0,
            jitter: true,
        }
    }

    /// Create a config with no retries (fire-and-forget)
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            exponential_base: 1.0,
            jitter: false,
        }
    }

    /// Convert to exponential backoff configuration
    fn to_exponential_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_delay_ms),
            max_interval: Duration::from_millis(self.max_delay_ms),
            multiplier: self.exponential_base,
            max_elapsed_time: None,
            ..Default::default()
        };

        if !self.jitter {
            backoff.randomization_factor = 0.0;
        }

        backoff
    }
}

/// Retry an async operation with exponential backoff
pub async fn retry_with_backoff<F, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> futures::future::BoxFuture<'static, Result<T, E>>,
    E: std::fmt::Debug + IsRetryable,
{
    if config.max_attempts <= 1 {
        debug!("No retry configured, executing operation once");
        return operation().await;
    }

    let mut backoff = config.to_exponential_backoff();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("Operation succeeded after {} attempts", attempt);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempt >= config.max_attempts || !error.is_retryable() {
                    return Err(error);
                }

                let Some(delay) = backoff.next_backoff() else {
                    warn!("Backoff exhausted after {} attempts", attempt);
                    return Err(error);
                };
                let delay = error.suggested_delay().map_or(delay, |d| d.min(delay * 4));
                warn!(
                    "Operation failed (attempt {}/{}), retrying in {:?}. Error: {:?}",
                    attempt, config.max_attempts, delay, error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Trait to determine if an error is retryable
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;

    /// Error-specific wait hint, such as a rate limit's retry-after
    fn suggested_delay(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        ProviderError::is_retryable(self)
    }

    fn suggested_delay(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let config = RetryConfig::new(3, 10, 1000); // Fast retry for testing
        let attempt_count = Arc::new(AtomicU32::new(0));

        let operation = || {
            let count = attempt_count.clone();
            Box::pin(async move {
                let current = count.fetch_add(1, Ordering::SeqCst) + 1;
                if current < 3 {
                    Err(TestError { retryable: true })
                } else {
                    Ok(current)
                }
            }) as futures::future::BoxFuture<'static, Result<u32, TestError>>
        };

        let result = retry_with_backoff(&config, operation).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_failure_not_retryable() {
        let config = RetryConfig::new(3, 10, 1000);
        let attempt_count = Arc::new(AtomicU32::new(0));

        let operation = || {
            let count = attempt_count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), TestError>(TestError { retryable: false })
            }) as futures::future::BoxFuture<'static, Result<(), TestError>>
        };

        let result: Result<(), TestError> = retry_with_backoff(&config, operation).await;
        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1); // Only one attempt
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_gives_up_after_max_attempts() {
        let config = RetryConfig::new(2, 10, 100);
        let attempt_count = Arc::new(AtomicU32::new(0));

        let operation = || {
            let count = attempt_count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), ProviderError>(ProviderError::ServiceUnavailable)
            }) as futures::future::BoxFuture<'static, Result<(), ProviderError>>
        };

        let result = retry_with_backoff(&config, operation).await;
        assert!(matches!(result, Err(ProviderError::ServiceUnavailable)));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_retry_runs_once() {
        let config = RetryConfig::no_retry();
        let attempt_count = Arc::new(AtomicU32::new(0));

        let operation = || {
            let count = attempt_count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), TestError>(TestError { retryable: true })
            }) as futures::future::BoxFuture<'static, Result<(), TestError>>
        };

        let result = tokio_test::block_on(retry_with_backoff(&config, operation));
        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }
}
