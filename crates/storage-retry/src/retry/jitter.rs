//! Randomization of backoff delays.
//!
//! Retry sequences that share a policy would otherwise back off in lockstep
//! after a shared dependency fails. Each sequence owns its own [`Jitter`]
//! source, so there is no shared generator to contend on, and tests can swap
//! in a deterministic one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of the random point inside a delay band.
pub trait Jitter: Send {
    /// Pick a duration in the inclusive range `[low, high]`.
    ///
    /// Callers guarantee `low <= high`.
    fn sample(&mut self, low: Duration, high: Duration) -> Duration;
}

/// Uniformly distributed jitter backed by a [`rand`] generator.
///
/// # Examples
///
/// ```rust
/// use storage_retry::retry::{Jitter, RandomJitter};
/// use std::time::Duration;
///
/// let mut jitter = RandomJitter::seeded(7);
/// let delay = jitter.sample(Duration::from_millis(5), Duration::from_millis(10));
/// assert!(delay >= Duration::from_millis(5) && delay <= Duration::from_millis(10));
/// ```
#[derive(Debug, Clone)]
pub struct RandomJitter<R = StdRng> {
    rng: R,
}

impl RandomJitter<StdRng> {
    /// Jitter seeded from operating system entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Jitter with a fixed seed; the same seed yields the same delays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomJitter<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomJitter<R> {
    /// Use an arbitrary generator.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> Jitter for RandomJitter<R> {
    fn sample(&mut self, low: Duration, high: Duration) -> Duration {
        let (low, high) = (low.as_nanos(), high.as_nanos());
        if low >= high {
            return from_nanos(high);
        }
        from_nanos(self.rng.gen_range(low..=high))
    }
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// `Duration::from_nanos` for values past `u64::MAX` nanoseconds (~584 years).
pub(crate) fn from_nanos(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

/// Deterministic jitter that always lands at the same relative position in
/// the band: `0.0` is the lower bound, `1.0` the upper bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedJitter {
    position: f64,
}

impl FixedJitter {
    /// Jitter at `position`, clamped to `[0.0, 1.0]`.
    pub fn new(position: f64) -> Self {
        let position = if position.is_nan() {
            0.0
        } else {
            position.clamp(0.0, 1.0)
        };
        Self { position }
    }

    /// Always the lower bound (half of the capped delay).
    pub fn lowest() -> Self {
        Self::new(0.0)
    }

    /// Always the upper bound (the capped delay itself).
    pub fn highest() -> Self {
        Self::new(1.0)
    }
}

impl Jitter for FixedJitter {
    fn sample(&mut self, low: Duration, high: Duration) -> Duration {
        let span = high.saturating_sub(low);
        low.saturating_add(span.mul_f64(self.position)).min(high)
    }
}
