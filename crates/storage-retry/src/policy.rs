//! Immutable retry policy.
//!
//! A [`RetryPolicy`] bundles the seven parameters that govern a retry
//! sequence. It is validated once when built and is `Copy`, so any number of
//! concurrent sequences can share one value without locking. Everything a
//! sequence counts (attempts, failures, elapsed time) lives in the executor,
//! never here.

use crate::config::RetryPolicyConfig;
use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-attempt timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Default attempt floor.
pub const DEFAULT_MIN_ATTEMPTS: u32 = 5;
/// Default attempt ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default delay after the first failure.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(10);
/// Default delay ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);
/// Default growth factor per failure.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
/// Default time window during which retries continue.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_millis(30_000);

/// Parameters for retrying a timed, fallible request with exponential backoff.
///
/// The first attempt runs immediately and is given `request_timeout` to
/// complete, after which it counts as a failure. After the n-th consecutive
/// failure the executor sleeps for a random duration between half of and all
/// of
///
/// ```text
/// min(initial_delay * backoff_factor^(n-1), max_delay)
/// ```
///
/// Retrying continues until an attempt succeeds, `max_attempts` attempts have
/// been made, or both `min_attempts` attempts have been made and
/// `retry_period` has elapsed since the first attempt started.
///
/// # Examples
///
/// ```rust
/// use storage_retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder()
///     .max_attempts(3)
///     .min_attempts(1)
///     .initial_delay(Duration::from_millis(50))
///     .build()?;
///
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.request_timeout(), Duration::from_secs(5));
/// # Ok::<(), storage_retry::PolicyError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RetryPolicyConfig", into = "RetryPolicyConfig")]
pub struct RetryPolicy {
    request_timeout: Duration,
    min_attempts: u32,
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    retry_period: Duration,
}

impl RetryPolicy {
    /// Create a new builder, pre-populated with the defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Time allowed for a single attempt.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Attempts made before the time-based cutoff may end the sequence.
    pub fn min_attempts(&self) -> u32 {
        self.min_attempts
    }

    /// Absolute ceiling on attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the first failure, before jitter.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Ceiling on the computed delay, before jitter.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor applied per consecutive failure.
    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Window, measured from the start of the first attempt, during which
    /// retries continue once `min_attempts` is reached.
    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }

    /// Check the parameter invariants.
    ///
    /// Durations cannot be negative once they are [`Duration`]s; negative
    /// millisecond values are rejected on the way in from
    /// [`RetryPolicyConfig`]. Every duration must be a whole number of
    /// milliseconds that fits the config's `i64` fields, so a policy
    /// serializes without losing precision.
    pub fn validate(&self) -> Result<()> {
        whole_millis("request_timeout", self.request_timeout)?;
        whole_millis("initial_delay", self.initial_delay)?;
        whole_millis("max_delay", self.max_delay)?;
        whole_millis("retry_period", self.retry_period)?;

        if self.min_attempts > self.max_attempts {
            return Err(PolicyError::AttemptBounds {
                min: self.min_attempts,
                max: self.max_attempts,
            });
        }
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(PolicyError::BackoffFactor(self.backoff_factor));
        }
        Ok(())
    }

    /// Project the policy back to its serializable form.
    pub fn to_config(&self) -> RetryPolicyConfig {
        RetryPolicyConfig::from(*self)
    }
}

impl Default for RetryPolicy {
    /// Defaults:
    /// - `request_timeout`: 5s
    /// - `min_attempts`: 5
    /// - `max_attempts`: 10
    /// - `initial_delay`: 10ms
    /// - `max_delay`: 10s
    /// - `backoff_factor`: 2.0
    /// - `retry_period`: 30s
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            min_attempts: DEFAULT_MIN_ATTEMPTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_period: DEFAULT_RETRY_PERIOD,
        }
    }
}

impl TryFrom<RetryPolicyConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(config: RetryPolicyConfig) -> Result<Self> {
        RetryPolicy::builder()
            .request_timeout(non_negative("request_timeout", config.request_timeout_ms)?)
            .min_attempts(config.min_attempts)
            .max_attempts(config.max_attempts)
            .initial_delay(non_negative("initial_delay", config.initial_delay_ms)?)
            .max_delay(non_negative("max_delay", config.max_delay_ms)?)
            .backoff_factor(config.backoff_factor)
            .retry_period(non_negative("retry_period", config.retry_period_ms)?)
            .build()
    }
}

fn whole_millis(field: &'static str, value: Duration) -> Result<()> {
    let fits = i64::try_from(value.as_millis()).is_ok();
    if fits && value.subsec_nanos() % 1_000_000 == 0 {
        Ok(())
    } else {
        Err(PolicyError::UnrepresentableDuration { field, value })
    }
}

fn non_negative(field: &'static str, value_ms: i64) -> Result<Duration> {
    u64::try_from(value_ms)
        .map(Duration::from_millis)
        .map_err(|_| PolicyError::NegativeDuration { field, value_ms })
}

/// Builder for [`RetryPolicy`].
///
/// Unset parameters take the documented defaults. [`build`](Self::build)
/// validates the combination.
///
/// # Examples
///
/// ```rust
/// use storage_retry::RetryPolicy;
///
/// let err = RetryPolicy::builder()
///     .min_attempts(8)
///     .max_attempts(4)
///     .build();
/// assert!(err.is_err());
/// ```
#[derive(Debug, Default, Clone)]
pub struct RetryPolicyBuilder {
    request_timeout: Option<Duration>,
    min_attempts: Option<u32>,
    max_attempts: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    backoff_factor: Option<f64>,
    retry_period: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Set the per-attempt timeout.
    ///
    /// Default: 5s
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the attempt floor.
    ///
    /// Default: 5
    pub fn min_attempts(mut self, attempts: u32) -> Self {
        self.min_attempts = Some(attempts);
        self
    }

    /// Set the attempt ceiling.
    ///
    /// Default: 10
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the delay after the first failure.
    ///
    /// Default: 10ms
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the delay ceiling.
    ///
    /// Default: 10s
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the growth factor. Must be at least 1.0; 1.0 gives a constant delay.
    ///
    /// Default: 2.0
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    /// Set the time window during which retries continue.
    ///
    /// Default: 30s
    pub fn retry_period(mut self, period: Duration) -> Self {
        self.retry_period = Some(period);
        self
    }

    /// Build and validate the policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] if `min_attempts > max_attempts`, the
    /// backoff factor is below 1.0, or a duration is not a whole number of
    /// milliseconds.
    pub fn build(self) -> Result<RetryPolicy> {
        let policy = RetryPolicy {
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            min_attempts: self.min_attempts.unwrap_or(DEFAULT_MIN_ATTEMPTS),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            initial_delay: self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY),
            max_delay: self.max_delay.unwrap_or(DEFAULT_MAX_DELAY),
            backoff_factor: self.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR),
            retry_period: self.retry_period.unwrap_or(DEFAULT_RETRY_PERIOD),
        };
        policy.validate()?;
        Ok(policy)
    }
}
