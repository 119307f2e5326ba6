//! Retry logic with exponential backoff
//!
//! This module provides the retry policy used by the fetch executor. The
//! policy is the combination of a [`RetryConfig`] (attempt budget and delay
//! schedule) and an [`IsRetryable`] classifier on the error type, so the
//! retry strategy can change without touching how fetches are scheduled.
//!
//! # Example
//!
//! ```no_run
//! use memories_dl::retry::{IsRetryable, with_retry};
//! use memories_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, |_attempt| async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, 5xx responses, full disk) should return `true`.
/// Permanent failures (404, malformed locator, permission denied) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Run an async operation until it succeeds, fails permanently, or the attempt budget is spent
///
/// The operation receives the 1-based attempt number. `config.max_attempts`
/// is the total number of calls; a value of 0 is treated as 1. Between
/// attempts the delay starts at `initial_delay` and is multiplied by
/// `backoff_multiplier`, capped at `max_delay`, with optional jitter.
///
/// Returns the successful result or the last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = config.initial_delay;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    "attempt failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(jittered_delay).await;

                delay = next_delay(delay, config);
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt,
                        "operation failed after all attempts"
                    );
                } else {
                    tracing::debug!(
                        error = %e,
                        attempt,
                        "operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Delay before the attempt after one that waited `delay`
///
/// Products that do not fit a `Duration` (huge or non-finite multipliers)
/// saturate at `max_delay`.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result is uniformly distributed between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn success_needs_one_call() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(5), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FetchError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_then_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(5), |_| {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Transient("timeout".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_counts_total_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(5), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Transient("503".into()))
            }
        })
        .await;

        assert_eq!(result, Err(FetchError::Transient("503".into())));
        assert_eq!(counter.load(Ordering::SeqCst), 5, "five attempts in total");
    }

    #[tokio::test]
    async fn permanent_error_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(5), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Permanent("404".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Permanent(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempt_numbers_are_passed_in_order() {
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _ = with_retry(&fast_config(3), |attempt| {
            let seen = seen_clone.clone();
            async move {
                seen.lock().await.push(attempt);
                Err::<(), _>(FetchError::Transient("x".into()))
            }
        })
        .await;

        assert_eq!(*seen.lock().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_budget_still_makes_one_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let _ = with_retry(&fast_config(0), |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(FetchError::Transient("x".into()))
            }
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_delays_increase_and_cap() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(40),
            max_delay: Duration::from_millis(80),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts_clone = timestamps.clone();

        let _ = with_retry(&config, |_| {
            let ts = ts_clone.clone();
            async move {
                ts.lock().await.push(std::time::Instant::now());
                Err::<(), _>(FetchError::Transient("x".into()))
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 4);
        let gaps: Vec<Duration> = ts.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_millis(35), "first gap {:?}", gaps[0]);
        assert!(gaps[1] >= Duration::from_millis(75), "second gap {:?}", gaps[1]);
        assert!(gaps[2] >= Duration::from_millis(75), "third gap {:?}", gaps[2]);
        assert!(
            gaps[2] < Duration::from_millis(400),
            "third gap should be capped, was {:?}",
            gaps[2]
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let delay = Duration::from_millis(50);
        for i in 0..200 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay, "iteration {i}: {jittered:?} < {delay:?}");
            assert!(jittered <= delay * 2, "iteration {i}: {jittered:?} > 2x");
        }
        assert_eq!(add_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn only_transient_fetch_errors_are_retryable() {
        assert!(FetchError::Transient("t".into()).is_retryable());
        assert!(!FetchError::Permanent("p".into()).is_retryable());
    }

    #[tokio::test]
    async fn oversized_multiplier_saturates_at_max_delay() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 1e300,
            jitter: true,
        };
        let started = std::time::Instant::now();

        let result = with_retry(&config, |_| async {
            Err::<(), _>(FetchError::Transient("x".into()))
        })
        .await;

        assert!(matches!(result, Err(FetchError::Transient(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn next_delay_handles_unrepresentable_products() {
        let mut config = fast_config(3);
        config.max_delay = Duration::from_millis(250);

        config.backoff_multiplier = 1e300;
        assert_eq!(next_delay(Duration::from_secs(1), &config), config.max_delay);

        config.backoff_multiplier = f64::NAN;
        assert_eq!(next_delay(Duration::from_secs(1), &config), config.max_delay);

        config.backoff_multiplier = 2.0;
        assert_eq!(
            next_delay(Duration::from_millis(100), &config),
            Duration::from_millis(200)
        );
    }
}
