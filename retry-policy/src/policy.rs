use std::time::Duration;

use crate::classify::{classify_message, Classify, FailureClass};
use crate::sleeper::{Sleeper, ThreadSleeper};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAYS_MS: [u64; 3] = [1_000, 2_000, 4_000];

/// Parameters of a [`BackoffPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Total tries including the first one.
    pub max_attempts: u32,
    /// Wait before retry `n` is `delays[min(n - 1, len - 1)]`.
    pub delays: Vec<Duration>,
    /// Fall back to message heuristics for errors classified `Unknown`.
    pub message_fallback: bool,
}

impl BackoffConfig {
    pub fn from_millis(max_attempts: u32, delays_ms: &[u64]) -> Self {
        Self {
            max_attempts,
            delays: delays_ms.iter().copied().map(Duration::from_millis).collect(),
            message_fallback: true,
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from_millis(DEFAULT_MAX_ATTEMPTS, &DEFAULT_DELAYS_MS)
    }
}

/// Result of one attempt after classification.
#[derive(Debug, PartialEq, Eq)]
pub enum AttemptOutcome<T, E> {
    Success(T),
    TransientFailure(E),
    /// Includes unclassified errors.
    PermanentFailure(E),
}

/// Retries a fallible operation on transient failures with a fixed delay
/// schedule.
///
/// Waiting is done through the [`Sleeper`]; with the default
/// [`ThreadSleeper`] the calling thread blocks for each delay and a started
/// run cannot be interrupted.
#[derive(Clone, Debug)]
pub struct BackoffPolicy<S = ThreadSleeper> {
    max_attempts: u32,
    delays: Vec<Duration>,
    message_fallback: bool,
    label: String,
    sleeper: S,
}

impl BackoffPolicy<ThreadSleeper> {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delays: config.delays,
            message_fallback: config.message_fallback,
            label: "operation".to_string(),
            sleeper: ThreadSleeper,
        }
    }
}

impl Default for BackoffPolicy<ThreadSleeper> {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl<S: Sleeper> BackoffPolicy<S> {
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> BackoffPolicy<T> {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            delays: self.delays,
            message_fallback: self.message_fallback,
            label: self.label,
            sleeper,
        }
    }

    /// Name used in log lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    /// `None` when the schedule is empty.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        let last = self.delays.len().checked_sub(1)?;
        let index = (attempt.saturating_sub(1) as usize).min(last);
        Some(self.delays[index])
    }

    /// Explicit classification first; message heuristics only for `Unknown`.
    pub fn classify<E: Classify>(&self, error: &E) -> FailureClass {
        match error.failure_class() {
            FailureClass::Unknown if self.message_fallback => classify_message(&error.to_string()),
            class => class,
        }
    }

    pub fn evaluate<T, E: Classify>(&self, result: Result<T, E>) -> AttemptOutcome<T, E> {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(error) => match self.classify(&error) {
                FailureClass::Transient => AttemptOutcome::TransientFailure(error),
                FailureClass::Permanent => AttemptOutcome::PermanentFailure(error),
                FailureClass::Unknown => {
                    tracing::debug!("Unclassified error in {} treated as non-retryable", self.label);
                    AttemptOutcome::PermanentFailure(error)
                }
            },
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. Returns the operation's value or its last error.
    pub fn run<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        E: Classify,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match self.evaluate(operation()) {
                AttemptOutcome::Success(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            "Successfully executed {} on attempt {}/{}",
                            self.label, attempt, self.max_attempts
                        );
                    }
                    return Ok(value);
                }
                AttemptOutcome::PermanentFailure(error) => {
                    tracing::error!("Non-retryable error in {}: {}. Not retrying.", self.label, error);
                    return Err(error);
                }
                AttemptOutcome::TransientFailure(error) => {
                    if attempt >= self.max_attempts {
                        tracing::error!(
                            "All {} attempts exhausted for {}. Final error: {}",
                            self.max_attempts, self.label, error
                        );
                        return Err(error);
                    }
                    match self.delay_after(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                "Retry attempt {}/{} for {}: {}. Waiting {:?} before retry",
                                attempt, self.max_attempts, self.label, error, delay
                            );
                            self.sleeper.sleep(delay);
                        }
                        None => tracing::warn!(
                            "Retry attempt {}/{} for {}: {}",
                            attempt, self.max_attempts, self.label, error
                        ),
                    }
                    attempt += 1;
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::RecordingSleeper;
    use std::cell::Cell;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    enum RemoteError {
        #[error("rate limited on attempt {0}")]
        RateLimited(u32),
        #[error("authentication failed")]
        Auth,
        #[error("{0}")]
        Opaque(String),
    }

    impl Classify for RemoteError {
        fn failure_class(&self) -> FailureClass {
            match self {
                RemoteError::RateLimited(_) => FailureClass::Transient,
                RemoteError::Auth => FailureClass::Permanent,
                RemoteError::Opaque(_) => FailureClass::Unknown,
            }
        }
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn test_defaults() {
        let policy = BackoffPolicy::new(BackoffConfig::default());
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_after(9), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_success_after_two_transient_failures() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::default()).with_sleeper(&sleeper);
        let calls = Cell::new(0);

        let result = policy.run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(RemoteError::RateLimited(calls.get()))
            } else {
                Ok("transcript")
            }
        });

        assert_eq!(result, Ok("transcript"));
        assert_eq!(calls.get(), 3);
        assert_eq!(sleeper.delays(), secs(&[1, 2]));
    }

    #[test]
    fn test_first_try_success_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::default()).with_sleeper(&sleeper);

        let result: Result<u32, RemoteError> = policy.run(|| Ok(7));

        assert_eq!(result, Ok(7));
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_permanent_error_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::from_millis(10, &[1_000]))
            .with_sleeper(&sleeper);
        let calls = Cell::new(0);

        let result: Result<(), _> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(RemoteError::Auth)
        });

        assert_eq!(result, Err(RemoteError::Auth));
        assert_eq!(calls.get(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::from_millis(5, &DEFAULT_DELAYS_MS))
            .with_sleeper(&sleeper);
        let calls = Cell::new(0);

        let result: Result<(), _> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(RemoteError::RateLimited(calls.get()))
        });

        assert_eq!(result, Err(RemoteError::RateLimited(5)));
        assert_eq!(calls.get(), 5);
        assert_eq!(sleeper.delays(), secs(&[1, 2, 4, 4]));
    }

    #[test]
    fn test_unknown_error_is_not_retried() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::default()).with_sleeper(&sleeper);
        let calls = Cell::new(0);

        let result: Result<(), _> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(RemoteError::Opaque("disk on fire".into()))
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_message_fallback_only_for_unknown() {
        let policy = BackoffPolicy::new(BackoffConfig::default());
        assert_eq!(policy.classify(&RemoteError::Opaque("HTTP 429: rate limit".into())), FailureClass::Transient);
        assert_eq!(policy.classify(&RemoteError::Opaque("401 unauthorized".into())), FailureClass::Permanent);

        let mut config = BackoffConfig::default();
        config.message_fallback = false;
        let strict = BackoffPolicy::new(config);
        assert_eq!(strict.classify(&RemoteError::Opaque("HTTP 429: rate limit".into())), FailureClass::Unknown);
    }

    #[test]
    fn test_unknown_with_transient_message_is_retried() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::default()).with_sleeper(&sleeper);
        let calls = Cell::new(0);

        let result: Result<(), _> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(RemoteError::Opaque("request timed out".into()))
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[test]
    fn test_zero_attempts_clamps_to_one() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::from_millis(0, &[10])).with_sleeper(&sleeper);
        let calls = Cell::new(0);

        let _: Result<(), _> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(RemoteError::RateLimited(1))
        });

        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(calls.get(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_empty_schedule_retries_without_waiting() {
        let sleeper = RecordingSleeper::new();
        let policy = BackoffPolicy::new(BackoffConfig::from_millis(3, &[])).with_sleeper(&sleeper);
        let calls = Cell::new(0);

        let _: Result<(), _> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(RemoteError::RateLimited(calls.get()))
        });

        assert_eq!(calls.get(), 3);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_evaluate_outcomes() {
        let policy = BackoffPolicy::new(BackoffConfig::default());
        assert_eq!(policy.evaluate::<u8, RemoteError>(Ok(1)), AttemptOutcome::Success(1));
        assert_eq!(
            policy.evaluate::<u8, _>(Err(RemoteError::RateLimited(1))),
            AttemptOutcome::TransientFailure(RemoteError::RateLimited(1))
        );
        assert_eq!(
            policy.evaluate::<u8, _>(Err(RemoteError::Opaque("??".into()))),
            AttemptOutcome::PermanentFailure(RemoteError::Opaque("??".into()))
        );
    }
}
