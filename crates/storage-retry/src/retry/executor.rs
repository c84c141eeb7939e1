//! The retry loop.

use super::backoff::Backoff;
use super::failure::Failure;
use super::jitter::{Jitter, RandomJitter};
use super::state::{AttemptOutcome, SequenceState};
use crate::error::{AttemptFailure, RetryError};
use crate::policy::RetryPolicy;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};

/// Drives one unit of work through a [`RetryPolicy`].
///
/// Each call to [`execute`](Self::execute) is an independent retry sequence:
/// attempt counters, elapsed time and the attempt history live on the stack
/// of that call. The executor itself only holds the policy, its jitter
/// source and an optional cancellation token, so it can be reused for
/// consecutive sequences. Concurrent sequences should each use their own
/// executor; the policy is `Copy` and can be handed to all of them.
///
/// # Examples
///
/// ```rust
/// use storage_retry::{Failure, RetryExecutor, RetryPolicy};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let policy = RetryPolicy::builder()
///     .initial_delay(Duration::from_millis(1))
///     .build()?;
///
/// let calls = Arc::new(AtomicU32::new(0));
/// let value = RetryExecutor::new(policy)
///     .with_operation("objects.get")
///     .execute(|| {
///         let calls = Arc::clone(&calls);
///         async move {
///             if calls.fetch_add(1, Ordering::SeqCst) < 2 {
///                 Err(Failure::retryable(std::io::Error::other("503 Service Unavailable")))
///             } else {
///                 Ok("object bytes")
///             }
///         }
///     })
///     .await?;
///
/// assert_eq!(value, "object bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryExecutor<J = RandomJitter> {
    policy: RetryPolicy,
    jitter: J,
    cancel: Option<CancellationToken>,
    operation: Option<String>,
}

impl RetryExecutor<RandomJitter> {
    /// Executor with entropy-seeded jitter and no cancellation.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            jitter: RandomJitter::new(),
            cancel: None,
            operation: None,
        }
    }
}

impl<J: Jitter> RetryExecutor<J> {
    /// Replace the jitter source.
    pub fn with_jitter<K: Jitter>(self, jitter: K) -> RetryExecutor<K> {
        RetryExecutor {
            policy: self.policy,
            jitter,
            cancel: self.cancel,
            operation: self.operation,
        }
    }

    /// Abort the sequence when `token` is cancelled.
    ///
    /// Cancellation interrupts both an in-flight attempt and an
    /// inter-attempt sleep.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Label recorded on the `retry` tracing span.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// The policy this executor applies.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The jitter source.
    pub fn jitter(&self) -> &J {
        &self.jitter
    }

    /// Run `work` until it succeeds, fails permanently, or the stopping rule
    /// ends the sequence.
    ///
    /// Every attempt is raced against the policy's `request_timeout`. When
    /// the timer wins, the attempt's future is dropped (its cancellation
    /// signal) and the attempt counts as a retryable timeout.
    ///
    /// # Errors
    ///
    /// - [`RetryError::InvalidPolicy`] if the policy fails validation
    /// - [`RetryError::NonRetryable`] on the first [`Failure::Permanent`]
    /// - [`RetryError::Exhausted`] when the stopping rule fires
    /// - [`RetryError::Cancelled`] when the cancellation token fires
    pub async fn execute<F, Fut, T, E>(&mut self, work: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
        E: fmt::Display,
    {
        let span = debug_span!(
            "retry",
            operation = self.operation.as_deref().unwrap_or("unnamed")
        );
        self.run(work).instrument(span).await
    }

    async fn run<F, Fut, T, E>(&mut self, mut work: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
        E: fmt::Display,
    {
        self.policy.validate()?;

        let backoff = Backoff::new(&self.policy);
        let timeout = self.policy.request_timeout();
        let mut state = SequenceState::start();
        let mut last: Option<AttemptFailure<E>> = None;

        loop {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                debug!(attempts = state.attempts(), "Retry cancelled before attempt");
                return Err(RetryError::Cancelled {
                    last,
                    report: state.into_report(),
                });
            }

            let (attempt, started_at) = state.begin_attempt();

            let result = tokio::select! {
                biased;
                () = cancelled(self.cancel.as_ref()) => {
                    debug!(attempt, "Retry cancelled during attempt");
                    return Err(RetryError::Cancelled {
                        last,
                        report: state.into_report(),
                    });
                }
                result = tokio::time::timeout(timeout, work()) => result,
            };

            let failure = match result {
                Ok(Ok(value)) => {
                    state.finish_attempt(started_at, AttemptOutcome::Success);
                    if attempt > 1 {
                        debug!(
                            attempts = attempt,
                            elapsed_ms = millis(state.elapsed()),
                            "Retry succeeded"
                        );
                    }
                    return Ok(value);
                }
                Ok(Err(Failure::Permanent(err))) => {
                    state.finish_attempt(started_at, AttemptOutcome::Failure);
                    debug!(attempt, error = %err, "Non-retryable failure");
                    return Err(RetryError::NonRetryable {
                        source: err,
                        report: state.into_report(),
                    });
                }
                Ok(Err(Failure::Retryable(err))) => {
                    state.finish_attempt(started_at, AttemptOutcome::Failure);
                    AttemptFailure::Failed(err)
                }
                Err(_elapsed) => {
                    state.finish_attempt(started_at, AttemptOutcome::Timeout);
                    AttemptFailure::Timeout(timeout)
                }
            };

            if state.should_stop(&self.policy) {
                warn!(
                    attempts = attempt,
                    elapsed_ms = millis(state.elapsed()),
                    last_delay_ms = state.last_delay().map(millis),
                    error = %failure,
                    "Retry budget exhausted"
                );
                return Err(RetryError::Exhausted {
                    last: failure,
                    report: state.into_report(),
                });
            }

            let delay = backoff.delay(state.consecutive_failures(), &mut self.jitter);
            state.record_delay(delay);
            debug!(
                attempt,
                failures = state.consecutive_failures(),
                delay_ms = millis(delay),
                error = %failure,
                "Attempt failed, backing off"
            );
            last = Some(failure);

            tokio::select! {
                biased;
                () = cancelled(self.cancel.as_ref()) => {
                    debug!(attempts = attempt, "Retry cancelled during backoff");
                    return Err(RetryError::Cancelled {
                        last,
                        report: state.into_report(),
                    });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Resolves when `token` is cancelled; never resolves without a token.
async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Whole milliseconds for log fields, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Run `work` under `policy` with default jitter and no cancellation.
///
/// # Examples
///
/// ```rust
/// use storage_retry::{Failure, RetryPolicy, retry};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let policy = RetryPolicy::default();
/// let size = retry(&policy, || async { Ok::<_, Failure<std::io::Error>>(1024) }).await?;
/// assert_eq!(size, 1024);
/// # Ok(())
/// # }
/// ```
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, work: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
    E: fmt::Display,
{
    RetryExecutor::new(*policy).execute(work).await
}
