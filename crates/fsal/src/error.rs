//! FSAL Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. A failed FSAL call is never fatal to the archive: scans
//! stop the current branch and extractors report a metadata error instead.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A filesystem abstraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for filesystem abstraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Path does not exist under the library root.
    #[display("path not found: {_0:?}")]
    NotFound(#[error(not(source))] String),
    /// Access denied by the underlying filesystem.
    #[display("permission denied: {_0:?}")]
    PermissionDenied(#[error(not(source))] String),
    /// A directory operation was attempted on a file.
    #[display("not a directory: {_0:?}")]
    NotADirectory(#[error(not(source))] String),
    /// Path contains invalid characters or escapes the library root.
    #[display("invalid path: {_0:?}")]
    InvalidPath(#[error(not(source))] String),
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
