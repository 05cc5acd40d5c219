//! Exponential backoff for reconnect attempts
//!
//! Health-aware connections use this to re-establish a dropped physical
//! connection. Delays grow exponentially, are capped, and may carry jitter so
//! a fleet of connections that dropped together does not reconnect in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Backoff policy for retried operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: f64,

    /// Add up to one extra delay of random jitter
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Delay to wait before retry number `attempt` (0-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);

        let delay_ms = if self.use_jitter && capped_ms > 0.0 {
            capped_ms + rand::thread_rng().gen_range(0.0..capped_ms)
        } else {
            capped_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

/// How a retried operation ended
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded after `attempts` tries
    Succeeded { value: T, attempts: u32 },

    /// Retries were exhausted or the error was not retryable
    Exhausted { error: E, attempts: u32 },

    /// The cancellation token fired between attempts
    Cancelled { attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

/// Run `operation` until it succeeds, the policy gives up, or `cancel` fires.
///
/// Cancellation is observed while sleeping between attempts; an attempt that
/// is already running is allowed to finish.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    is_retryable: R,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled { attempts };
        }

        attempts += 1;

        let error = match operation().await {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts },
            Err(error) => error,
        };

        if attempts > config.max_retries || !is_retryable(&error) {
            return RetryOutcome::Exhausted { error, attempts };
        }

        let delay = config.calculate_delay(attempts - 1);
        tracing::debug!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after failure"
        );

        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Policy presets
pub mod presets {
    use super::*;

    /// Reconnecting a dropped store connection
    pub fn reconnect() -> RetryConfig {
        RetryConfig::default()
    }

    /// Give up after the first failure
    pub fn no_retry() -> RetryConfig {
        RetryConfig::new().with_max_retries(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[test]
    fn test_calculate_delay_grows_and_caps() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(500));
        assert_eq!(config.calculate_delay(12), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_one_extra_delay() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(true);

        let delay = config.calculate_delay(0);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(200));
    }

    #[test]
    fn test_presets() {
        assert_eq!(presets::no_retry().max_retries, 0);
        assert_eq!(presets::reconnect(), RetryConfig::default());
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = retry_with_backoff(
            &fast().with_max_retries(3),
            &CancellationToken::new(),
            |_: &String| true,
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("refused".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let outcome = retry_with_backoff(
            &fast().with_max_retries(2),
            &CancellationToken::new(),
            |_: &String| true,
            || async { Err::<(), _>("down".to_string()) },
        )
        .await;

        match outcome {
            RetryOutcome::Exhausted { error, attempts } => {
                assert_eq!(error, "down");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let outcome = retry_with_backoff(
            &fast().with_max_retries(5),
            &CancellationToken::new(),
            |err: &String| !err.contains("invalid"),
            || async { Err::<(), _>("invalid address".to_string()) },
        )
        .await;

        assert_eq!(outcome.attempts(), 1);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = retry_with_backoff(
            &fast(),
            &cancel,
            |_: &String| true,
            || async { Ok::<_, String>(1) },
        )
        .await;

        assert!(matches!(outcome, RetryOutcome::Cancelled { attempts: 0 }));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let config = RetryConfig::new()
            .with_max_retries(10)
            .with_initial_delay(Duration::from_secs(60))
            .with_jitter(false);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = retry_with_backoff(&config, &cancel, |_: &String| true, || async {
            Err::<(), _>("down".to_string())
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Cancelled { attempts: 1 }));
    }
}
