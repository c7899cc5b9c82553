//! Retry with exponential backoff for backend calls.

use std::future::Future;
use std::time::Duration;

use coterie_common::{AppResult, config::RetrySettings};

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            multiplier: settings.multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// Only errors for which [`coterie_common::AppError::is_retryable`] holds are
/// retried. The last error is returned unchanged.
pub async fn retry<T, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !err.is_retryable() || !config.should_retry(attempt) {
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying backend call"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use coterie_common::{AppError, BackendErrorKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_max_delay() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(200), Duration::from_secs(30));
    }

    #[test]
    fn test_from_settings() {
        let config = RetryConfig::from(&RetrySettings::default());
        assert_eq!(config, RetryConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(&RetryConfig::default(), "test", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(AppError::backend(BackendErrorKind::Unavailable, "down"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let err = retry(&RetryConfig::default(), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::backend(BackendErrorKind::DeadlineExceeded, "slow"))
            }
        })
        .await
        .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s of backoff between the four attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = retry(&RetryConfig::default(), "test", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::backend(BackendErrorKind::PermissionDenied, "no"))
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Backend {
                kind: BackendErrorKind::PermissionDenied,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
