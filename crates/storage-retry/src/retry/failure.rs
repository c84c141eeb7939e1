//! Failure classification for units of work.

use std::fmt;

/// A failed attempt, classified by the unit of work.
///
/// The executor never inspects the error itself: a [`Retryable`](Failure::Retryable)
/// failure feeds the stopping rule and the backoff, a
/// [`Permanent`](Failure::Permanent) one ends the sequence immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// Worth another attempt (e.g. a dropped connection or a 503).
    Retryable(E),
    /// Retrying cannot help (e.g. a 404 or an authorization failure).
    Permanent(E),
}

impl<E> Failure<E> {
    /// Wrap an error as retryable.
    pub fn retryable(err: E) -> Self {
        Failure::Retryable(err)
    }

    /// Wrap an error as permanent.
    pub fn permanent(err: E) -> Self {
        Failure::Permanent(err)
    }

    /// Classify an error with a predicate that returns `true` for retryable
    /// errors.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use storage_retry::Failure;
    /// use std::io;
    ///
    /// let err = io::Error::from(io::ErrorKind::ConnectionReset);
    /// let failure = Failure::classify(err, |e| e.kind() != io::ErrorKind::NotFound);
    /// assert!(failure.is_retryable());
    /// ```
    pub fn classify(err: E, is_retryable: impl FnOnce(&E) -> bool) -> Self {
        if is_retryable(&err) {
            Failure::Retryable(err)
        } else {
            Failure::Permanent(err)
        }
    }

    /// Returns `true` if another attempt may be made.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Failure::Retryable(_))
    }

    /// Borrow the underlying error.
    pub fn error(&self) -> &E {
        match self {
            Failure::Retryable(err) | Failure::Permanent(err) => err,
        }
    }

    /// Discard the classification.
    pub fn into_inner(self) -> E {
        match self {
            Failure::Retryable(err) | Failure::Permanent(err) => err,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Retryable(err) => write!(f, "retryable: {err}"),
            Failure::Permanent(err) => write!(f, "permanent: {err}"),
        }
    }
}

/// Errors that know whether they are worth retrying.
///
/// Implementing this lets a unit of work use `?` directly: the error is
/// converted into a [`Failure`] according to [`is_retryable`](Self::is_retryable).
///
/// # Examples
///
/// ```rust
/// use storage_retry::{Failure, Retryable};
///
/// #[derive(Debug)]
/// enum GcsError {
///     Unavailable,
///     NotFound,
/// }
///
/// impl Retryable for GcsError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, GcsError::Unavailable)
///     }
/// }
///
/// fn download() -> Result<Vec<u8>, GcsError> {
///     Err(GcsError::NotFound)
/// }
///
/// fn fetch() -> Result<Vec<u8>, Failure<GcsError>> {
///     let bytes = download()?;
///     Ok(bytes)
/// }
///
/// assert!(!fetch().unwrap_err().is_retryable());
/// ```
pub trait Retryable {
    /// Returns `true` if the operation that produced this error may be retried.
    fn is_retryable(&self) -> bool;
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind;

        matches!(
            self.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::ConnectionRefused
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::Interrupted
                | ErrorKind::UnexpectedEof
                | ErrorKind::WouldBlock
        )
    }
}

impl<E: Retryable> From<E> for Failure<E> {
    fn from(err: E) -> Self {
        if err.is_retryable() {
            Failure::Retryable(err)
        } else {
            Failure::Permanent(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_classification() {
        let reset: Failure<io::Error> = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert!(reset.is_retryable());

        let denied: Failure<io::Error> = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(!denied.is_retryable());
    }

    #[test]
    fn test_classify_with_predicate() {
        let failure = Failure::classify(503u16, |status| *status >= 500);
        assert_eq!(failure, Failure::Retryable(503));

        let failure = Failure::classify(404u16, |status| *status >= 500);
        assert_eq!(failure, Failure::Permanent(404));
        assert_eq!(failure.into_inner(), 404);
    }

    #[test]
    fn test_display() {
        let failure = Failure::retryable(io::Error::other("socket closed"));
        assert_eq!(failure.to_string(), "retryable: socket closed");
        assert_eq!(failure.error().to_string(), "socket closed");
    }
}
