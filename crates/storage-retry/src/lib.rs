#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Retry and backoff policy engine for remote storage clients.
//!
//! A client library hands this crate a fallible, timed operation (an object
//! read, a bucket listing, an upload chunk) and a [`RetryPolicy`]. The
//! engine decides how long each attempt may run, how long to wait between
//! attempts, and when to give up:
//!
//! - **Per-attempt timeout** via `request_timeout`; a timeout is a retryable
//!   failure
//! - **Exponential backoff with jitter**, capped at `max_delay`, each delay
//!   drawn uniformly between half of and all of the capped term
//! - **Stopping rule** combining an absolute `max_attempts` ceiling with a
//!   `retry_period` time window that only applies after `min_attempts`
//! - **Cancellation** of in-flight attempts and backoff sleeps through a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken)
//!
//! The policy is an immutable `Copy` value shared freely between concurrent
//! sequences; every sequence keeps its own counters and jitter source.
//!
//! # Examples
//!
//! Using the prelude for convenient imports:
//!
//! ```rust
//! use storage_retry::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .min_attempts(1)
//!     .initial_delay(Duration::from_millis(100))
//!     .build()?;
//!
//! let result = RetryExecutor::new(policy)
//!     .execute(|| async { Ok::<_, Failure<std::io::Error>>(42) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod policy;
pub mod retry;

pub use config::RetryPolicyConfig;
pub use error::{AttemptFailure, PolicyError, RetryError, RetryReport, Termination};
pub use policy::{RetryPolicy, RetryPolicyBuilder};
pub use retry::{Failure, RetryExecutor, Retryable, retry};

/// Convenient re-exports of commonly used items.
///
/// Import all core abstractions with:
///
/// ```rust
/// use storage_retry::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::RetryPolicyConfig;
    pub use crate::error::{RetryError, Termination};
    pub use crate::policy::RetryPolicy;
    pub use crate::retry::{
        Backoff, Failure, FixedJitter, Jitter, RandomJitter, RetryExecutor, Retryable, retry,
    };
}
