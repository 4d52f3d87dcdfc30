//! Retry policies for failed requests.
//!
//! A policy answers two independent questions for the executor: whether an
//! attempt should be retried, and how long to wait before the next one.
//! Attempts are 0-based, so the first retry waits `backoff(0)`.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Transport-level failure handed to a policy.
pub type AttemptError<'a> = &'a (dyn StdError + Send + Sync + 'static);

/// Decides whether and when a failed attempt is retried.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Whether attempt `attempt` should be followed by another one.
    ///
    /// `status` is `None` when no response was received; `error` is set for
    /// transport-level failures.
    fn should_retry(&self, attempt: u32, status: Option<u16>, error: Option<AttemptError<'_>>)
        -> bool;

    /// Delay before the attempt following `attempt`.
    fn backoff(&self, attempt: u32) -> Duration;
}

/// Retry configuration for [`DefaultRetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Status codes that trigger a retry.
    pub retryable_status_codes: HashSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            retryable_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
        }
    }
}

impl RetryConfig {
    /// Builder: set the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder: set base and maximum delay.
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Builder: replace the retryable status set.
    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }
}

/// Exponential backoff capped at `max_delay`, retrying transport failures
/// and the configured status codes.
#[derive(Debug, Clone, Default)]
pub struct DefaultRetryPolicy {
    config: RetryConfig,
}

impl DefaultRetryPolicy {
    /// Create a policy from a configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(
        &self,
        attempt: u32,
        status: Option<u16>,
        error: Option<AttemptError<'_>>,
    ) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }
        if error.is_some() {
            return true;
        }
        status.is_some_and(|code| self.config.retryable_status_codes.contains(&code))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.config.base_delay.checked_mul(factor))
            .map_or(self.config.max_delay, |delay| delay.min(self.config.max_delay))
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&self, _: u32, _: Option<u16>, _: Option<AttemptError<'_>>) -> bool {
        false
    }

    fn backoff(&self, _: u32) -> Duration {
        Duration::ZERO
    }
}

type ShouldRetryFn = dyn Fn(u32, Option<u16>, Option<AttemptError<'_>>) -> bool + Send + Sync;
type BackoffFn = dyn Fn(u32) -> Duration + Send + Sync;

/// Policy whose decision and delay are supplied by the caller.
///
/// The `max_retries` ceiling is enforced before the decision closure runs.
#[derive(Clone)]
pub struct CustomRetryPolicy {
    max_retries: u32,
    should_retry: Arc<ShouldRetryFn>,
    backoff: Arc<BackoffFn>,
}

impl CustomRetryPolicy {
    /// Create a custom policy.
    pub fn new<R, B>(max_retries: u32, should_retry: R, backoff: B) -> Self
    where
        R: Fn(u32, Option<u16>, Option<AttemptError<'_>>) -> bool + Send + Sync + 'static,
        B: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_retries,
            should_retry: Arc::new(should_retry),
            backoff: Arc::new(backoff),
        }
    }
}

impl fmt::Debug for CustomRetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRetryPolicy")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy for CustomRetryPolicy {
    fn should_retry(
        &self,
        attempt: u32,
        status: Option<u16>,
        error: Option<AttemptError<'_>>,
    ) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        (self.should_retry)(attempt, status, error)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}
