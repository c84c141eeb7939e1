//! Behavioral tests for the retry executor
//!
//! All tests run on a paused tokio clock so timeouts and backoff sleeps
//! complete instantly and elapsed times are deterministic.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage_retry::retry::{AttemptOutcome, Jitter, RandomJitter};
use storage_retry::{
    AttemptFailure, Failure, RetryError, RetryExecutor, RetryPolicy, Retryable, Termination,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Jitter that records every band it is asked for and picks the upper bound.
#[derive(Clone, Default)]
struct RecordingJitter {
    bands: Arc<Mutex<Vec<(Duration, Duration)>>>,
}

impl RecordingJitter {
    fn bands(&self) -> Vec<(Duration, Duration)> {
        self.bands.lock().unwrap().clone()
    }
}

impl Jitter for RecordingJitter {
    fn sample(&mut self, low: Duration, high: Duration) -> Duration {
        self.bands.lock().unwrap().push((low, high));
        high
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("storage_retry=debug")
        .with_test_writer()
        .try_init();
}

fn always_failing(
    calls: &Arc<AtomicU32>,
) -> impl FnMut() -> std::future::Ready<Result<(), Failure<io::Error>>> + use<> {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Err(Failure::retryable(io::Error::other("503 backend error"))))
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn test_max_attempts_bounds_sequence_regardless_of_retry_period() {
    init_tracing();
    let policy = RetryPolicy::builder()
        .min_attempts(1)
        .max_attempts(3)
        .retry_period(Duration::from_secs(3600))
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let err = RetryExecutor::new(policy)
        .execute(always_failing(&calls))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.termination(), Termination::Exhausted);
    assert_eq!(err.attempts(), 3);
    assert!(matches!(err, RetryError::Exhausted { last: AttemptFailure::Failed(_), .. }));
}

#[tokio::test(start_paused = true)]
async fn test_time_gate_waits_for_attempt_floor() {
    let policy = RetryPolicy::builder()
        .min_attempts(5)
        .max_attempts(100)
        .retry_period(Duration::ZERO)
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let err = RetryExecutor::new(policy)
        .execute(always_failing(&calls))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(err.termination(), Termination::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_retry_period_ends_slow_sequence_before_max_attempts() {
    let policy = RetryPolicy::builder()
        .min_attempts(2)
        .max_attempts(100)
        .request_timeout(Duration::from_secs(1))
        .initial_delay(ms(100))
        .max_delay(ms(100))
        .retry_period(Duration::from_secs(5))
        .build()
        .unwrap();

    // Every attempt times out after 1s and is followed by a 100ms delay, so
    // the 5s window closes during the fifth attempt.
    let err = RetryExecutor::new(policy)
        .with_jitter(RecordingJitter::default())
        .execute(|| std::future::pending::<Result<(), Failure<io::Error>>>())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 5);
    assert!(err.elapsed() >= Duration::from_secs(5));
    let report = err.report().unwrap();
    assert!(
        report
            .history
            .iter()
            .all(|record| record.outcome == AttemptOutcome::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_short_circuits() {
    let jitter = RecordingJitter::default();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let err = RetryExecutor::new(RetryPolicy::default())
        .with_jitter(jitter.clone())
        .execute(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Failure::permanent(io::Error::other("403 Forbidden"))) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.termination(), Termination::NonRetryable);
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.last_error().unwrap().to_string(), "403 Forbidden");
    assert!(jitter.bands().is_empty(), "no delay may be computed");
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_wins_over_bounds() {
    // Fails retryably twice, then permanently; the permanent failure ends the
    // sequence even though attempts and time remain.
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let err = RetryExecutor::new(RetryPolicy::default())
        .execute(move || {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err::<(), _>(Failure::retryable(io::Error::other("timeout")))
                } else {
                    Err(Failure::permanent(io::Error::other("object deleted")))
                }
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.termination(), Termination::NonRetryable);
    let history = &err.report().unwrap().history;
    assert_eq!(history.len(), 3);
    assert!(history[2].delay_after.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_never_returning_work_times_out_after_request_timeout() {
    let policy = RetryPolicy::builder()
        .min_attempts(1)
        .max_attempts(1)
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let start = Instant::now();

    let err = RetryExecutor::new(policy)
        .execute(|| std::future::pending::<Result<(), Failure<io::Error>>>())
        .await
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5), "timed out early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6));
    match err {
        RetryError::Exhausted { last, report } => {
            assert!(last.is_timeout());
            assert!(matches!(last, AttemptFailure::Timeout(d) if d == Duration::from_secs(5)));
            assert_eq!(report.history[0].outcome, AttemptOutcome::Timeout);
        }
        other => panic!("expected exhausted timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_work_finishing_inside_timeout_is_not_cut_short() {
    let policy = RetryPolicy::builder()
        .min_attempts(1)
        .max_attempts(1)
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let value = RetryExecutor::new(policy)
        .execute(|| async {
            tokio::time::sleep(ms(4990)).await;
            Ok::<_, Failure<io::Error>>("slow but fine")
        })
        .await
        .unwrap();

    assert_eq!(value, "slow but fine");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_retried() {
    let policy = RetryPolicy::builder()
        .min_attempts(1)
        .max_attempts(3)
        .request_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let value = RetryExecutor::new(policy)
        .execute(move || {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    std::future::pending::<()>().await;
                }
                Ok::<_, Failure<io::Error>>(call)
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_success_stops_delay_computation() {
    let jitter = RecordingJitter::default();
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let value = RetryExecutor::new(RetryPolicy::default())
        .with_jitter(jitter.clone())
        .execute(move || {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(Failure::retryable(io::Error::other("connection reset")))
                } else {
                    Ok(call + 1)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 3);
    assert_eq!(jitter.bands().len(), 2, "one delay per failure, none after success");
}

#[tokio::test(start_paused = true)]
async fn test_default_policy_delay_bands() {
    let jitter = RecordingJitter::default();

    let _ = RetryExecutor::new(RetryPolicy::default())
        .with_jitter(jitter.clone())
        .execute(|| async { Err::<(), _>(Failure::retryable(io::Error::other("flaky"))) })
        .await;

    let bands = jitter.bands();
    // Ten attempts, nine delays in between.
    assert_eq!(bands.len(), 9);
    assert_eq!(bands[0], (ms(5), ms(10)));
    assert_eq!(bands[1], (ms(10), ms(20)));
    assert_eq!(bands[2], (ms(20), ms(40)));
    assert_eq!(bands[3], (ms(40), ms(80)));
    assert_eq!(bands[8], (ms(1280), ms(2560)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_attempt() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(250)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let err = RetryExecutor::new(RetryPolicy::default())
        .with_cancellation(token)
        .execute(|| std::future::pending::<Result<(), Failure<io::Error>>>())
        .await
        .unwrap_err();

    assert_eq!(err.termination(), Termination::Cancelled);
    assert_eq!(err.attempts(), 1);
    assert!(err.last_error().is_none());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_start_makes_no_attempt() {
    let token = CancellationToken::new();
    token.cancel();
    let calls = Arc::new(AtomicU32::new(0));

    let err = RetryExecutor::new(RetryPolicy::default())
        .with_cancellation(token)
        .execute(always_failing(&calls))
        .await
        .unwrap_err();

    assert_eq!(err.termination(), Termination::Cancelled);
    assert_eq!(err.attempts(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sequences_share_one_policy() {
    let policy = RetryPolicy::builder()
        .min_attempts(1)
        .max_attempts(4)
        .initial_delay(ms(100))
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for seed in 0..16u64 {
        handles.push(tokio::spawn(async move {
            let calls = Arc::new(AtomicU32::new(0));
            let err = RetryExecutor::new(policy)
                .with_jitter(RandomJitter::seeded(seed))
                .execute(always_failing(&calls))
                .await
                .unwrap_err();
            (calls.load(Ordering::SeqCst), err.report().unwrap().history.clone())
        }));
    }

    let mut first_delays = Vec::new();
    for handle in handles {
        let (calls, history) = handle.await.unwrap();
        assert_eq!(calls, 4);
        let delay = history[0].delay_after.unwrap();
        assert!(delay >= ms(50) && delay <= ms(100));
        first_delays.push(delay);
    }

    first_delays.sort();
    first_delays.dedup();
    assert!(first_delays.len() > 1, "sequences should not back off in lockstep");
}

#[derive(Debug, thiserror::Error)]
enum ObjectError {
    #[error("service unavailable")]
    Unavailable,
    #[error("no such object: {0}")]
    NotFound(String),
}

impl Retryable for ObjectError {
    fn is_retryable(&self) -> bool {
        matches!(self, ObjectError::Unavailable)
    }
}

async fn fetch_object(call: u32) -> Result<Vec<u8>, ObjectError> {
    match call {
        0 => Err(ObjectError::Unavailable),
        _ => Err(ObjectError::NotFound("logs/2024-01-01.gz".to_string())),
    }
}

#[tokio::test(start_paused = true)]
async fn test_self_classifying_errors_convert_with_question_mark() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);

    let err = RetryExecutor::new(RetryPolicy::default())
        .execute(move || {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                let bytes = fetch_object(call).await?;
                Ok::<_, Failure<ObjectError>>(bytes)
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(err.termination(), Termination::NonRetryable);
    assert_eq!(
        err.to_string(),
        "non-retryable failure on attempt 2: no such object: logs/2024-01-01.gz"
    );
}
