//! Example: Retrying storage requests with a RetryPolicy
//!
//! This example demonstrates:
//! 1. Simple retry with exponential backoff
//! 2. Classifying errors (retry 503s, give up on 404s)
//! 3. Per-attempt timeouts on a hung request
//! 4. The delay schedule with jitter bands
//!
//! Run with:
//! ```bash
//! cargo run -p storage-retry --example retry_example
//! ```

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use storage_retry::prelude::*;

/// A simulated object store that fails the first few reads
struct FlakyBucket {
    reads: Arc<AtomicU32>,
    fail_count: u32,
}

impl FlakyBucket {
    fn new(fail_count: u32) -> Self {
        Self {
            reads: Arc::new(AtomicU32::new(0)),
            fail_count,
        }
    }

    async fn read(&self, name: &str) -> Result<String, Failure<std::io::Error>> {
        let attempt = self.reads.fetch_add(1, Ordering::SeqCst);

        if attempt < self.fail_count {
            println!("  Attempt {}: 503 Service Unavailable", attempt + 1);
            Err(Failure::retryable(std::io::Error::other(
                "503 Service Unavailable",
            )))
        } else {
            println!("  Attempt {}: 200 OK", attempt + 1);
            Ok(format!("contents of {name}"))
        }
    }

    fn total_reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Example 1: Simple retry with exponential backoff
async fn example_simple_retry() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Simple Retry with Exponential Backoff ===\n");

    let policy = RetryPolicy::builder()
        .min_attempts(1)
        .max_attempts(4)
        .initial_delay(Duration::from_millis(100))
        .backoff_factor(2.0)
        .build()?;

    let bucket = FlakyBucket::new(2);

    println!("Reading an object (will fail 2 times before succeeding)...");
    let start = Instant::now();

    let result = RetryExecutor::new(policy)
        .with_jitter(FixedJitter::highest()) // No randomness for predictable output
        .with_operation("objects.get")
        .execute(|| bucket.read("reports/q3.csv"))
        .await?;

    println!("\nResult: {}", result);
    println!("Total attempts: {}", bucket.total_reads());
    println!("Total time: {:?}", start.elapsed());
    println!("Expected delays: 100ms + 200ms = ~300ms");

    Ok(())
}

/// Example 2: Only some errors are worth retrying
async fn example_classification() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Error Classification ===\n");

    let policy = RetryPolicy::builder()
        .initial_delay(Duration::from_millis(10))
        .build()?;

    println!("Test 1: 404 Not Found (should NOT retry)");
    let err = retry(&policy, || async {
        let status = 404u16;
        Err::<(), _>(Failure::classify(status, |s| *s >= 500 || *s == 429))
    })
    .await
    .unwrap_err();
    println!("  {} ({:?} after {} attempt)", err, err.termination(), err.attempts());

    println!("\nTest 2: Connection reset (should retry)");
    let attempts = Arc::new(AtomicU32::new(0));
    let result = retry(&policy, || {
        let attempts = Arc::clone(&attempts);
        async move {
            let current = attempts.fetch_add(1, Ordering::SeqCst);
            if current < 2 {
                println!("  Attempt {}: connection reset", current + 1);
                // io::Error implements Retryable, so the conversion classifies it
                let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
                Err(Failure::from(reset))
            } else {
                println!("  Attempt {}: Success!", current + 1);
                Ok("success")
            }
        }
    })
    .await?;
    println!("Result: {}, total attempts: {}", result, attempts.load(Ordering::SeqCst));

    Ok(())
}

/// Example 3: A request that hangs is cut off by request_timeout
async fn example_timeout() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Per-Attempt Timeout ===\n");

    let policy = RetryPolicy::builder()
        .request_timeout(Duration::from_millis(50))
        .min_attempts(1)
        .max_attempts(3)
        .initial_delay(Duration::from_millis(10))
        .build()?;

    let start = Instant::now();
    let err = retry(&policy, || {
        std::future::pending::<Result<(), Failure<std::io::Error>>>()
    })
    .await
    .unwrap_err();

    println!("  {}", err);
    if let Some(report) = err.report() {
        for record in &report.history {
            println!(
                "  Attempt {}: {:?} after {:?}, then waited {:?}",
                record.index, record.outcome, record.duration, record.delay_after
            );
        }
    }
    println!("Total time: {:?}", start.elapsed());

    Ok(())
}

/// Example 4: The delay schedule for the default policy
fn example_schedule() {
    println!("\n=== Example 4: Default Delay Schedule ===\n");

    let backoff = Backoff::new(&RetryPolicy::default());
    let mut jitter = RandomJitter::new();

    for failures in [1, 2, 4, 8, 11, 15] {
        let high = backoff.upper_bound(failures);
        println!(
            "  After failure {:>2}: band [{:?}, {:?}], drew {:?}",
            failures,
            high / 2,
            high,
            backoff.delay(failures, &mut jitter)
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("==============================================");
    println!("   Storage Retry: Retry Policy Examples");
    println!("==============================================");

    example_simple_retry().await?;
    example_classification().await?;
    example_timeout().await?;
    example_schedule();

    println!("\n==============================================");
    println!("   All examples completed successfully!");
    println!("==============================================\n");

    Ok(())
}
