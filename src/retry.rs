//! Retry logic with exponential backoff
//!
//! Delays grow as `base_delay * 2^n` (n = 0 for the first retry) plus uniformly distributed
//! jitter in `[0, 1000)` ms, so concurrent workers hitting the same rate limit do not retry
//! in lockstep.
//!
//! # Example
//!
//! ```no_run
//! use render_batch::retry::{RetryPolicy, retry_in_place};
//! use render_batch::ErrorRecord;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, Duration::from_millis(500));
//! let (result, attempts) = retry_in_place(&policy, None, |_, _, _| {}, || async {
//!     Ok::<_, ErrorRecord>("rendered")
//! })
//! .await;
//! # }
//! ```

use crate::config::RunnerConfig;
use crate::error::ErrorRecord;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound (exclusive) of the random jitter added to every retry delay
pub const MAX_JITTER: Duration = Duration::from_millis(1000);

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, rate limiting, 5xx) should return `true`.
/// Permanent failures (malformed URL, authentication failed, 4xx) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ErrorRecord {
    fn is_retryable(&self) -> bool {
        self.retriable
    }
}

/// Whether another attempt should follow a failure
///
/// `attempt_number` counts the calls already made. Returns false once it reaches
/// `max_attempts`, or when the error is not retriable.
pub fn should_retry<E: IsRetryable>(error: &E, attempt_number: u32, max_attempts: u32) -> bool {
    attempt_number < max_attempts && error.is_retryable()
}

/// Delay before retry number `attempt_number` (0-indexed), jitter included
pub fn next_delay(attempt_number: u32, base_delay: Duration) -> Duration {
    backoff(attempt_number, base_delay) + jitter()
}

/// Exponential part of the delay: `base_delay * 2^attempt_number`, saturating
fn backoff(attempt_number: u32, base_delay: Duration) -> Duration {
    let factor = 1u32 << attempt_number.min(31);
    base_delay.saturating_mul(factor)
}

/// Random delay in `[0, MAX_JITTER)`
fn jitter() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..MAX_JITTER.as_millis() as u64))
}

/// Retry settings of one batch run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per item, including the first
    pub max_attempts: u32,
    /// Base of the exponential backoff
    pub base_delay: Duration,
    /// Cap on the exponential part (None = uncapped)
    pub max_delay: Option<Duration>,
    /// Whether to add random jitter
    pub jitter: bool,
}

impl RetryPolicy {
    /// Jittered, uncapped policy
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: None,
            jitter: true,
        }
    }

    /// Policy described by a runner configuration
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Whether a failure after `attempt_number` calls deserves another attempt
    pub fn should_retry<E: IsRetryable>(&self, error: &E, attempt_number: u32) -> bool {
        should_retry(error, attempt_number, self.max_attempts)
    }

    /// Delay before retry number `attempt_number` (0-indexed)
    pub fn next_delay(&self, attempt_number: u32) -> Duration {
        let mut delay = backoff(attempt_number, self.base_delay);
        if let Some(cap) = self.max_delay {
            delay = delay.min(cap);
        }
        if self.jitter {
            delay += jitter();
        }
        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}

/// Drive `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// The same logical item is retried in place; `on_retry(attempt, delay, error)` is called
/// before each backoff wait. A raised `cancel` token stops further retries (the in-flight
/// call is never interrupted) and ends a pending backoff early.
///
/// Returns the final result and the number of calls made. Terminal failures are only logged
/// at debug level; reporting them is up to the caller.
pub async fn retry_in_place<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    mut on_retry: R,
    mut operation: F,
) -> (Result<T, E>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    R: FnMut(u32, Duration, &E),
{
    let mut attempts = 0;

    loop {
        let result = operation().await;
        attempts += 1;

        let error = match result {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(attempts, "Operation succeeded after retry");
                }
                return (Ok(value), attempts);
            }
            Err(e) => e,
        };

        if !policy.should_retry(&error, attempts) {
            if error.is_retryable() {
                tracing::debug!(
                    error = %error,
                    attempts,
                    "Retry attempts exhausted"
                );
            } else {
                tracing::debug!(error = %error, "Error is not retryable");
            }
            return (Err(error), attempts);
        }

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            tracing::debug!(attempts, "Cancellation raised, not retrying");
            return (Err(error), attempts);
        }

        let delay = policy.next_delay(attempts - 1);
        tracing::warn!(
            error = %error,
            attempt = attempts,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Operation failed, retrying"
        );
        on_retry(attempts, delay, &error);

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => {
                        tracing::debug!(attempts, "Cancellation raised during backoff");
                        return (Err(error), attempts);
                    }
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn deterministic(max_attempts: u32, base_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: None,
            jitter: false,
        }
    }

    #[test]
    fn should_retry_stops_at_max_attempts() {
        let err = ErrorRecord::transient("timeout");
        assert!(should_retry(&err, 1, 3));
        assert!(should_retry(&err, 2, 3));
        assert!(!should_retry(&err, 3, 3));
        assert!(!should_retry(&err, 4, 3));
    }

    #[test]
    fn should_retry_rejects_permanent_errors() {
        let err = ErrorRecord::permanent("malformed url");
        assert!(!should_retry(&err, 1, 10));
    }

    #[test]
    fn single_attempt_never_retries() {
        let err = ErrorRecord::transient("timeout");
        assert!(!should_retry(&err, 1, 1));
    }

    #[test]
    fn next_delay_doubles_with_jitter_below_one_second() {
        let base = Duration::from_millis(100);
        for attempt in 0..5 {
            let expected = base * 2u32.pow(attempt);
            for _ in 0..50 {
                let delay = next_delay(attempt, base);
                assert!(delay >= expected, "attempt {attempt}: {delay:?} < {expected:?}");
                assert!(
                    delay < expected + MAX_JITTER,
                    "attempt {attempt}: {delay:?} has more than 1s of jitter"
                );
            }
        }
    }

    #[test]
    fn jitter_on_zero_base_stays_below_one_second() {
        for _ in 0..200 {
            assert!(next_delay(0, Duration::ZERO) < MAX_JITTER);
        }
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let delay = backoff(200, Duration::from_secs(u64::MAX / 2));
        assert_eq!(delay, Duration::MAX);
    }

    #[test]
    fn policy_without_jitter_is_exact() {
        let policy = deterministic(5, 10);
        assert_eq!(policy.next_delay(0), Duration::from_millis(10));
        assert_eq!(policy.next_delay(1), Duration::from_millis(20));
        assert_eq!(policy.next_delay(3), Duration::from_millis(80));
    }

    #[test]
    fn policy_caps_exponential_part() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_millis(50)),
            ..deterministic(5, 10)
        };
        assert_eq!(policy.next_delay(1), Duration::from_millis(20));
        assert_eq!(policy.next_delay(4), Duration::from_millis(50));
    }

    #[test]
    fn policy_from_config_copies_settings() {
        let config = RunnerConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            jitter: false,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from_config(&config), deterministic(4, 250));
    }

    #[tokio::test]
    async fn success_needs_one_call() {
        let counter = Arc::new(AtomicU32::new(0));
        let (result, attempts) = retry_in_place(&deterministic(3, 1), None, |_, _, _| {}, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ErrorRecord>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_then_success_waits_for_backoff() {
        let counter = Arc::new(AtomicU32::new(0));
        let start = std::time::Instant::now();

        let (result, attempts) = retry_in_place(&deterministic(3, 10), None, |_, _, _| {}, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ErrorRecord::transient("busy"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(30),
            "should wait 10ms + 20ms, waited {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn retriable_failure_is_bounded_by_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(AtomicU32::new(0));

        let (result, attempts) = retry_in_place(
            &deterministic(4, 1),
            None,
            |_, _, _| {
                retries.fetch_add(1, Ordering::SeqCst);
            },
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ErrorRecord::transient("timeout"))
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 4);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(retries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_short_circuits() {
        let counter = Arc::new(AtomicU32::new(0));

        let (result, attempts) = retry_in_place(&deterministic(5, 1), None, |_, _, _| {}, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ErrorRecord::permanent("401 unauthorized"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::Permanent);
        assert_eq!(attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn on_retry_sees_attempt_and_delay() {
        let seen = std::sync::Mutex::new(Vec::new());

        let _ = retry_in_place(
            &deterministic(3, 5),
            None,
            |attempt, delay, _err: &ErrorRecord| seen.lock().unwrap().push((attempt, delay)),
            || async { Err::<(), _>(ErrorRecord::transient("timeout")) },
        )
        .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, Duration::from_millis(5)),
                (2, Duration::from_millis(10))
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_cuts_backoff_short() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let start = std::time::Instant::now();
        let (result, attempts) = retry_in_place(
            &deterministic(3, 5_000),
            Some(&token),
            |_, _, _| {},
            || async { Err::<(), _>(ErrorRecord::transient("timeout")) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1, "no retry after cancellation");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn already_cancelled_token_prevents_retry() {
        let token = CancellationToken::new();
        token.cancel();
        let counter = Arc::new(AtomicU32::new(0));

        let (_, attempts) = retry_in_place(&deterministic(5, 1), Some(&token), |_, _, _| {}, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ErrorRecord::transient("timeout"))
            }
        })
        .await;

        assert_eq!(attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
