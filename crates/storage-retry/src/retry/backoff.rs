//! Exponential backoff with a ceiling and half-band jitter.

use super::jitter::{Jitter, from_nanos};
use crate::policy::RetryPolicy;
use std::time::Duration;

/// Delay schedule derived from a [`RetryPolicy`].
///
/// # Mathematical Formula
///
/// For the n-th consecutive failure (n ≥ 1):
/// ```text
/// raw    = initial_delay * backoff_factor^(n-1)
/// capped = min(raw, max_delay)
/// delay  = uniform(capped / 2, capped)
/// ```
///
/// # Examples
///
/// ```rust
/// use storage_retry::RetryPolicy;
/// use storage_retry::retry::{Backoff, FixedJitter};
/// use std::time::Duration;
///
/// let backoff = Backoff::new(&RetryPolicy::default());
///
/// // 10ms * 2^3
/// assert_eq!(backoff.upper_bound(4), Duration::from_millis(80));
/// assert_eq!(backoff.delay(4, &mut FixedJitter::lowest()), Duration::from_millis(40));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl Backoff {
    /// Schedule for the given policy.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            initial_delay: policy.initial_delay(),
            max_delay: policy.max_delay(),
            factor: policy.backoff_factor(),
        }
    }

    /// The capped exponential term for `failures` consecutive failures.
    ///
    /// This is the upper bound of the jittered delay; the lower bound is half
    /// of it. `failures` of 0 is treated as 1.
    pub fn upper_bound(&self, failures: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
        // Nanosecond arithmetic keeps power-of-two growth exact.
        let raw = self.initial_delay.as_nanos() as f64 * self.factor.powi(exponent);
        let cap = self.max_delay.as_nanos() as f64;

        if raw.is_nan() || raw >= cap {
            self.max_delay
        } else {
            // The f64 cap can round above max_delay itself.
            from_nanos(raw as u128).min(self.max_delay)
        }
    }

    /// Jittered delay for `failures` consecutive failures.
    pub fn delay<J: Jitter + ?Sized>(&self, failures: u32, jitter: &mut J) -> Duration {
        let capped = self.upper_bound(failures);
        jitter.sample(capped / 2, capped)
    }
}
