//! Retry execution, backoff and jitter.
//!
//! # Key Types
//!
//! - [`RetryExecutor`] - runs a unit of work under a [`RetryPolicy`](crate::RetryPolicy)
//! - [`Failure`] - how the unit of work classifies its errors
//! - [`Backoff`] - the capped exponential delay schedule
//! - [`Jitter`] - injectable randomness for delays
//!
//! # Examples
//!
//! ```rust
//! use storage_retry::{Failure, RetryPolicy, retry};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .min_attempts(1)
//!     .initial_delay(Duration::from_millis(100))
//!     .build()?;
//!
//! let result = retry(&policy, || async {
//!     // Your storage request here
//!     Ok::<_, Failure<std::io::Error>>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod executor;
mod failure;
mod jitter;
mod state;

pub use backoff::Backoff;
pub use executor::{RetryExecutor, retry};
pub use failure::{Failure, Retryable};
pub use jitter::{FixedJitter, Jitter, RandomJitter};
pub use state::{AttemptOutcome, AttemptRecord};
