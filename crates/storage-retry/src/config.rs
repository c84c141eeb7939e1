//! Serializable retry configuration.
//!
//! [`RetryPolicyConfig`] is the wire/file shape of a [`RetryPolicy`]: plain
//! millisecond integers that can come from TOML, JSON or the environment.
//! Durations are signed here on purpose, so a negative value coming from a
//! config source is reported as [`PolicyError::NegativeDuration`] instead of
//! failing deep inside a deserializer.
//!
//! [`PolicyError::NegativeDuration`]: crate::error::PolicyError::NegativeDuration

use crate::error::Result;
use crate::policy::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_MIN_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_PERIOD, RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix of the environment variables read by [`RetryPolicyConfig::from_env`].
pub const ENV_PREFIX: &str = "STORAGE_RETRY_";

/// Unvalidated retry parameters.
///
/// Every field is optional in serialized form and falls back to the
/// [`RetryPolicy`] defaults.
///
/// # Examples
///
/// ```rust
/// use storage_retry::{RetryPolicy, RetryPolicyConfig};
///
/// let config = RetryPolicyConfig {
///     max_attempts: 3,
///     min_attempts: 1,
///     ..Default::default()
/// };
/// let policy = RetryPolicy::try_from(config)?;
/// assert_eq!(policy.max_attempts(), 3);
/// # Ok::<(), storage_retry::PolicyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Per-attempt timeout in milliseconds
    pub request_timeout_ms: i64,
    /// Attempt floor
    pub min_attempts: u32,
    /// Attempt ceiling
    pub max_attempts: u32,
    /// Delay after the first failure in milliseconds
    pub initial_delay_ms: i64,
    /// Delay ceiling in milliseconds
    pub max_delay_ms: i64,
    /// Growth factor per consecutive failure
    pub backoff_factor: f64,
    /// Retry window in milliseconds
    pub retry_period_ms: i64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: millis(DEFAULT_REQUEST_TIMEOUT),
            min_attempts: DEFAULT_MIN_ATTEMPTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: millis(DEFAULT_INITIAL_DELAY),
            max_delay_ms: millis(DEFAULT_MAX_DELAY),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_period_ms: millis(DEFAULT_RETRY_PERIOD),
        }
    }
}

impl From<RetryPolicy> for RetryPolicyConfig {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            request_timeout_ms: millis(policy.request_timeout()),
            min_attempts: policy.min_attempts(),
            max_attempts: policy.max_attempts(),
            initial_delay_ms: millis(policy.initial_delay()),
            max_delay_ms: millis(policy.max_delay()),
            backoff_factor: policy.backoff_factor(),
            retry_period_ms: millis(policy.retry_period()),
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl RetryPolicyConfig {
    /// Validate the parameters and build a [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`](crate::PolicyError) when the combination is
    /// inconsistent or a duration is negative.
    pub fn into_policy(self) -> Result<RetryPolicy> {
        RetryPolicy::try_from(self)
    }

    /// Load configuration from environment variables.
    ///
    /// Starts from the defaults and overrides each field whose variable is
    /// set and parses:
    /// - `STORAGE_RETRY_REQUEST_TIMEOUT_MS`
    /// - `STORAGE_RETRY_MIN_ATTEMPTS`
    /// - `STORAGE_RETRY_MAX_ATTEMPTS`
    /// - `STORAGE_RETRY_INITIAL_DELAY_MS`
    /// - `STORAGE_RETRY_MAX_DELAY_MS`
    /// - `STORAGE_RETRY_BACKOFF_FACTOR`
    /// - `STORAGE_RETRY_PERIOD_MS`
    ///
    /// Values that fail to parse are ignored. Validation happens when the
    /// result is turned into a [`RetryPolicy`].
    #[cfg(feature = "env")]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = env_var("REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = value;
        }
        if let Some(value) = env_var("MIN_ATTEMPTS") {
            config.min_attempts = value;
        }
        if let Some(value) = env_var("MAX_ATTEMPTS") {
            config.max_attempts = value;
        }
        if let Some(value) = env_var("INITIAL_DELAY_MS") {
            config.initial_delay_ms = value;
        }
        if let Some(value) = env_var("MAX_DELAY_MS") {
            config.max_delay_ms = value;
        }
        if let Some(value) = env_var("BACKOFF_FACTOR") {
            config.backoff_factor = value;
        }
        if let Some(value) = env_var("PERIOD_MS") {
            config.retry_period_ms = value;
        }

        config
    }
}

#[cfg(feature = "env")]
fn env_var<T: std::str::FromStr>(suffix: &str) -> Option<T> {
    let name = format!("{ENV_PREFIX}{suffix}");
    let raw = std::env::var(&name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::debug!(variable = %name, value = %raw, "Ignoring unparsable retry setting");
            None
        }
    }
}
