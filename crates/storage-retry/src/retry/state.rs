//! Bookkeeping owned by a single retry sequence.

use crate::error::RetryReport;
use crate::policy::RetryPolicy;
use std::time::Duration;
use tokio::time::Instant;

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    /// The unit of work returned a value.
    Success,
    /// The unit of work returned an error.
    Failure,
    /// The attempt ran past `request_timeout`.
    Timeout,
}

/// One attempt of a retry sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptRecord {
    /// 1-based position in the sequence
    pub index: u32,
    /// When the attempt started
    pub started_at: Instant,
    /// How long the attempt ran
    pub duration: Duration,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
    /// Delay slept after this attempt, if another one followed
    pub delay_after: Option<Duration>,
}

/// Counters for one invocation of the executor. Never shared.
#[derive(Debug)]
pub(crate) struct SequenceState {
    started_at: Instant,
    attempts: u32,
    consecutive_failures: u32,
    last_delay: Option<Duration>,
    history: Vec<AttemptRecord>,
}

impl SequenceState {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Instant::now(),
            attempts: 0,
            consecutive_failures: 0,
            last_delay: None,
            history: Vec::new(),
        }
    }

    /// Count a new attempt and return its index and start time.
    pub(crate) fn begin_attempt(&mut self) -> (u32, Instant) {
        self.attempts = self.attempts.saturating_add(1);
        (self.attempts, Instant::now())
    }

    pub(crate) fn finish_attempt(&mut self, started_at: Instant, outcome: AttemptOutcome) {
        if outcome != AttemptOutcome::Success {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        self.history.push(AttemptRecord {
            index: self.attempts,
            started_at,
            duration: started_at.elapsed(),
            outcome,
            delay_after: None,
        });
    }

    pub(crate) fn record_delay(&mut self, delay: Duration) {
        self.last_delay = Some(delay);
        if let Some(last) = self.history.last_mut() {
            last.delay_after = Some(delay);
        }
    }

    /// Stop once `max_attempts` is reached, or once both `min_attempts` is
    /// reached and `retry_period` has elapsed since the first attempt.
    pub(crate) fn should_stop(&self, policy: &RetryPolicy) -> bool {
        self.attempts >= policy.max_attempts()
            || (self.attempts >= policy.min_attempts()
                && self.elapsed() >= policy.retry_period())
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn into_report(self) -> RetryReport {
        RetryReport {
            attempts: self.attempts,
            elapsed: self.started_at.elapsed(),
            history: self.history,
        }
    }
}
