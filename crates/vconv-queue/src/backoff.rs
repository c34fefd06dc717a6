//! Bounded linear backoff for connect-time retries.
//!
//! The wait before attempt `n + 1` is `n * unit`. Once `max_attempts` have
//! failed the caller gets the last error back; for broker and store connects
//! that is fatal to the process.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Retry policy with linearly growing waits.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait multiplied by the attempt number.
    pub unit: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            unit: Duration::from_secs(5),
            operation_name: "operation".to_string(),
        }
    }
}

impl LinearBackoff {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Wait after the given failed attempt (1-based).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    pub fn into_result(self) -> Result<T, (E, u32)> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, attempts } => Err((error, attempts)),
        }
    }
}

/// Run `operation` until it succeeds or the policy's attempts are exhausted.
pub async fn retry_linear<F, Fut, T, E>(policy: &LinearBackoff, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", policy.operation_name, attempt);
                }
                return RetryResult::Success(value);
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_after_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    policy.operation_name, attempt, policy.max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}), giving up: {}",
                    policy.operation_name, attempt, policy.max_attempts, e
                );
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt,
                };
            }
        }
    }
}

/// Suppresses log spam from a check that keeps failing.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a success (resets the failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failure. Returns `true` if it should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_is_linear() {
        let policy = LinearBackoff::new("test").with_unit(Duration::from_secs(5));

        assert_eq!(policy.delay_after_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after_attempt(2), Duration::from_secs(10));
        assert_eq!(policy.delay_after_attempt(4), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = LinearBackoff::new("test")
            .with_max_attempts(5)
            .with_unit(Duration::from_secs(5));
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = retry_linear(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("refused") }
        })
        .await;

        assert!(!result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // 5 + 10 + 15 + 20 seconds of waiting, none after the last attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(50));
        let (_, attempts) = result.into_result().unwrap_err();
        assert_eq!(attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eventual_success() {
        let policy = LinearBackoff::new("test").with_unit(Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let result = retry_linear(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.into_result().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failure_tracker_suppression() {
        let mut tracker = FailureTracker::new(2);

        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }
}
