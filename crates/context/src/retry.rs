//! Retry policy: transient-error detection plus a back-off strategy.
//!
//! [`RetryPolicy::execute`] re-runs an action while the failure is classified
//! as transient and the strategy grants another attempt. A non-transient
//! failure is returned immediately, without sleeping. When the strategy gives
//! up on a transient failure, the last error is wrapped in
//! [`ContextError::Connectivity`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant, Stop};
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ContextError, Retryability};

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Decides which errors are worth another attempt.
pub trait TransientErrorDetection: Send + Sync + fmt::Debug {
    /// Returns `true` if `error` is transient.
    fn is_transient(&self, error: &ContextError) -> bool;
}

/// Treats connection failures, timeouts, resets and decorator failures marked
/// transient as retriable. Everything else, including any response status, is
/// fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebTransientErrorDetection;

impl TransientErrorDetection for WebTransientErrorDetection {
    fn is_transient(&self, error: &ContextError) -> bool {
        matches!(error.retryability(), Retryability::Retryable)
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Produces the delay schedule for one [`RetryPolicy::execute`] call.
pub trait RetryStrategy: Send + Sync + fmt::Debug {
    /// Starts a fresh schedule. `next_backoff` returning `None` means stop.
    fn schedule(&self) -> Box<dyn Backoff + Send>;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn schedule(&self) -> Box<dyn Backoff + Send> {
        Box::new(Stop {})
    }
}

/// Retries a fixed number of times with a constant delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    retries: u32,
    interval: Duration,
}

impl FixedInterval {
    /// Creates a strategy allowing `retries` retries spaced by `interval`.
    pub fn new(retries: u32, interval: Duration) -> Self {
        Self { retries, interval }
    }
}

impl RetryStrategy for FixedInterval {
    fn schedule(&self) -> Box<dyn Backoff + Send> {
        Box::new(Limited::new(Constant::new(self.interval), self.retries))
    }
}

/// Randomised exponential back-off, limited to a number of retries.
///
/// The first delay is `min_backoff`, each later one grows by `multiplier` up
/// to `max_backoff`, and every delay is jittered by `randomization_factor`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialRetry {
    retries: u32,
    settings: RetrySettings,
}

impl ExponentialRetry {
    /// Builds the strategy from configured settings.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            retries: settings.max_attempts.saturating_sub(1),
            settings: *settings,
        }
    }
}

impl RetryStrategy for ExponentialRetry {
    fn schedule(&self) -> Box<dyn Backoff + Send> {
        let exponential = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.settings.min_backoff_ms))
            .with_max_interval(Duration::from_millis(self.settings.max_backoff_ms))
            .with_multiplier(self.settings.multiplier)
            .with_randomization_factor(self.settings.randomization_factor)
            .with_max_elapsed_time(None)
            .build();
        Box::new(Limited::new(exponential, self.retries))
    }
}

/// Caps an unbounded schedule at `retries` delays.
#[derive(Debug)]
struct Limited<B> {
    inner: B,
    retries: u32,
    remaining: u32,
}

impl<B: Backoff> Limited<B> {
    fn new(inner: B, retries: u32) -> Self {
        Self {
            inner,
            retries,
            remaining: retries,
        }
    }
}

impl<B: Backoff> Backoff for Limited<B> {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.remaining = self.retries;
        self.inner.reset();
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Serialisable retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub min_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays. At least 1.
    pub multiplier: f64,
    /// Jitter applied to each delay, in `[0, 1]`.
    pub randomization_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
            randomization_factor: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Sleeping
// ---------------------------------------------------------------------------

/// Blocks between attempts.
pub trait Sleeper: Send + Sync + fmt::Debug {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Runs an action under a detection strategy and a back-off strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    detection: Arc<dyn TransientErrorDetection>,
    strategy: Arc<dyn RetryStrategy>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    /// Creates a policy that sleeps on the calling thread.
    pub fn new(
        detection: Arc<dyn TransientErrorDetection>,
        strategy: Arc<dyn RetryStrategy>,
    ) -> Self {
        Self {
            detection,
            strategy,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// The default web policy: [`WebTransientErrorDetection`] with
    /// [`ExponentialRetry`] built from `settings`.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            Arc::new(WebTransientErrorDetection),
            Arc::new(ExponentialRetry::from_settings(settings)),
        )
    }

    /// Replaces the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Runs `action` until it succeeds, fails non-transiently, or the
    /// strategy stops granting retries.
    ///
    /// # Errors
    ///
    /// - A non-transient error from `action`, returned unchanged and immediately.
    /// - [`ContextError::Connectivity`] wrapping the last transient error once
    ///   retries are exhausted.
    pub fn execute<T, F>(&self, mut action: F) -> Result<T, ContextError>
    where
        F: FnMut() -> Result<T, ContextError>,
    {
        let mut schedule = self.strategy.schedule();
        let mut attempt: u32 = 1;
        loop {
            let error = match action() {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.detection.is_transient(&error) {
                debug!(attempt, error = %error, "non-transient failure, not retrying");
                return Err(error);
            }

            let Some(delay) = schedule.next_backoff() else {
                warn!(attempts = attempt, error = %error, "retries exhausted");
                return Err(ContextError::Connectivity {
                    attempts: attempt,
                    last: Box::new(error),
                });
            };

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;
    use crate::{TransportError, TransportErrorKind};

    #[derive(Debug, Default)]
    struct RecordingSleeper(Mutex<Vec<Duration>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn policy(retries: u32) -> (RetryPolicy, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RetryPolicy::new(
            Arc::new(WebTransientErrorDetection),
            Arc::new(FixedInterval::new(retries, Duration::from_millis(10))),
        )
        .with_sleeper(sleeper.clone());
        (policy, sleeper)
    }

    fn timeout() -> ContextError {
        TransportError::new(TransportErrorKind::Timeout, "timed out").into()
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let (policy, sleeper) = policy(3);
        let mut calls = 0;
        let result = policy.execute(|| {
            calls += 1;
            if calls < 3 {
                Err(timeout())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn exhausted_retries_surface_as_connectivity() {
        let (policy, sleeper) = policy(2);
        let mut calls = 0;
        let err = policy
            .execute::<(), _>(|| {
                calls += 1;
                Err(timeout())
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
        match err {
            ContextError::Connectivity { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ContextError::Transport(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fatal_error_returns_immediately_without_sleeping() {
        let (policy, sleeper) = policy(5);
        let mut calls = 0;
        let err = policy
            .execute::<(), _>(|| {
                calls += 1;
                Err(ContextError::UnexpectedStatus {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    uri: "https://media.example/".to_string(),
                })
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
        assert!(matches!(err, ContextError::UnexpectedStatus { .. }));
    }

    #[test]
    fn no_retry_wraps_first_transient_failure() {
        let policy = RetryPolicy::new(Arc::new(WebTransientErrorDetection), Arc::new(NoRetry));
        let err = policy.execute::<(), _>(|| Err(timeout())).unwrap_err();
        assert!(matches!(err, ContextError::Connectivity { attempts: 1, .. }));
    }

    fn settings(max_attempts: u32, randomization_factor: f64) -> RetrySettings {
        RetrySettings {
            max_attempts,
            min_backoff_ms: 100,
            max_backoff_ms: 1_000,
            multiplier: 2.0,
            randomization_factor,
        }
    }

    #[test]
    fn exponential_schedule_doubles_and_is_capped() {
        let mut schedule = ExponentialRetry::from_settings(&settings(7, 0.0)).schedule();
        let delays: Vec<u64> = std::iter::from_fn(|| schedule.next_backoff())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn exponential_schedule_jitters_within_the_factor() {
        let mut schedule = ExponentialRetry::from_settings(&settings(2, 0.2)).schedule();
        let first = schedule.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));
        assert_eq!(schedule.next_backoff(), None);
    }

    #[test]
    fn each_execution_starts_a_fresh_schedule() {
        let (policy, sleeper) = policy(1);
        for _ in 0..2 {
            let err = policy.execute::<(), _>(|| Err(timeout())).unwrap_err();
            assert!(matches!(err, ContextError::Connectivity { attempts: 2, .. }));
        }
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn settings_max_attempts_counts_the_first_attempt() {
        let mut schedule = ExponentialRetry::from_settings(&settings(1, 0.0)).schedule();
        assert_eq!(schedule.next_backoff(), None);
    }
}
