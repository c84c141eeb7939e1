//! Error types for retry policies and retry sequences.
//!
//! Two layers live here:
//!
//! - [`PolicyError`] rejects malformed policy parameters. It is raised at
//!   construction time and again, defensively, when a sequence starts.
//! - [`RetryError`] is the single terminal failure of a retry sequence. It
//!   wraps the last observed failure together with a [`RetryReport`] so
//!   callers can see how many attempts were made and how long it took.

use crate::retry::AttemptRecord;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for policy construction and validation.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// A retry policy whose parameters are inconsistent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// `min_attempts` is greater than `max_attempts`.
    #[error("min_attempts ({min}) exceeds max_attempts ({max})")]
    AttemptBounds {
        /// Configured attempt floor
        min: u32,
        /// Configured attempt ceiling
        max: u32,
    },

    /// A duration parameter was negative.
    #[error("{field} must not be negative (got {value_ms}ms)")]
    NegativeDuration {
        /// Name of the offending parameter
        field: &'static str,
        /// Value as supplied, in milliseconds
        value_ms: i64,
    },

    /// A duration parameter cannot be written back as whole milliseconds,
    /// so it would not survive serialization unchanged.
    #[error("{field} must be a whole number of milliseconds up to i64::MAX (got {value:?})")]
    UnrepresentableDuration {
        /// Name of the offending parameter
        field: &'static str,
        /// Value as supplied
        value: Duration,
    },

    /// `backoff_factor` is below 1.0 or not a number.
    #[error("backoff_factor must be at least 1.0 (got {0})")]
    BackoffFactor(f64),
}

/// Why a single attempt failed.
///
/// Both variants are retryable from the executor's point of view; a
/// permanent failure never becomes an `AttemptFailure` because it ends the
/// sequence on the spot.
#[derive(Debug, Error)]
pub enum AttemptFailure<E> {
    /// The attempt did not finish within the policy's `request_timeout`.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The unit of work reported a retryable failure.
    #[error(transparent)]
    Failed(E),
}

impl<E> AttemptFailure<E> {
    /// Returns `true` for a timed-out attempt.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptFailure::Timeout(_))
    }

    /// The underlying error, if the attempt returned one.
    pub fn error(&self) -> Option<&E> {
        match self {
            AttemptFailure::Timeout(_) => None,
            AttemptFailure::Failed(err) => Some(err),
        }
    }
}

/// Diagnostic metadata attached to every failed retry sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryReport {
    /// Total attempts made, including the final one
    pub attempts: u32,
    /// Wall-clock time from the start of the first attempt to the outcome
    pub elapsed: Duration,
    /// One record per attempt, oldest first
    pub history: Vec<AttemptRecord>,
}

/// Which way a failed retry sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The policy was rejected before any attempt ran.
    InvalidPolicy,
    /// The stopping rule fired before any attempt succeeded.
    Exhausted,
    /// The unit of work reported a failure that must not be retried.
    NonRetryable,
    /// An external cancellation signal interrupted the sequence.
    Cancelled,
}

/// Terminal failure of a retry sequence.
///
/// Every invocation of the executor yields exactly one outcome: the success
/// value or one of these variants.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The policy failed validation; no attempt was made.
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    /// The unit of work failed in a way it classified as permanent.
    #[error("non-retryable failure on attempt {}: {source}", .report.attempts)]
    NonRetryable {
        /// The permanent failure
        source: E,
        /// Attempt telemetry
        report: RetryReport,
    },

    /// The stopping rule ended the sequence.
    #[error(
        "retries exhausted after {} attempts in {:?}: {last}",
        .report.attempts,
        .report.elapsed
    )]
    Exhausted {
        /// The failure observed on the final attempt
        #[source]
        last: AttemptFailure<E>,
        /// Attempt telemetry
        report: RetryReport,
    },

    /// The sequence was cancelled while waiting on an attempt or a delay.
    #[error("retry cancelled after {} attempts", .report.attempts)]
    Cancelled {
        /// The most recent failure before cancellation, if any
        last: Option<AttemptFailure<E>>,
        /// Attempt telemetry
        report: RetryReport,
    },
}

impl<E> RetryError<E> {
    /// Classify how the sequence ended.
    pub fn termination(&self) -> Termination {
        match self {
            RetryError::InvalidPolicy(_) => Termination::InvalidPolicy,
            RetryError::NonRetryable { .. } => Termination::NonRetryable,
            RetryError::Exhausted { .. } => Termination::Exhausted,
            RetryError::Cancelled { .. } => Termination::Cancelled,
        }
    }

    /// Attempt telemetry, absent only for [`RetryError::InvalidPolicy`].
    pub fn report(&self) -> Option<&RetryReport> {
        match self {
            RetryError::InvalidPolicy(_) => None,
            RetryError::NonRetryable { report, .. }
            | RetryError::Exhausted { report, .. }
            | RetryError::Cancelled { report, .. } => Some(report),
        }
    }

    /// Number of attempts made before the sequence ended.
    pub fn attempts(&self) -> u32 {
        self.report().map_or(0, |report| report.attempts)
    }

    /// Elapsed time of the sequence.
    pub fn elapsed(&self) -> Duration {
        self.report().map_or(Duration::ZERO, |report| report.elapsed)
    }

    /// The last error returned by the unit of work, if there was one.
    ///
    /// Timeouts carry no error value, so an exhausted sequence whose final
    /// attempt timed out returns `None`.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::InvalidPolicy(_) => None,
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Exhausted { last, .. } => last.error(),
            RetryError::Cancelled { last, .. } => last.as_ref().and_then(AttemptFailure::error),
        }
    }
}
