//! Archive Error Types
//!
//! Database, filesystem and scheduler failures propagate to the caller. Cache
//! failures never do: they are logged and treated as a miss. Extraction
//! failures never reach this crate's callers either, processors recover from
//! them locally.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A row could not be turned back into a record.
    #[display("invalid archive data: {_0}")]
    InvalidData(#[error(not(source))] String),
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// A content type name that the registry does not know. A programming
    /// error on the caller's side.
    #[display("unknown content type: {_0}")]
    UnknownContentType(#[error(not(source))] String),
    /// No processor accepted a path. The generic processor accepts every
    /// path, so this indicates a broken registry.
    #[display("no processor for path: {_0}")]
    NoProcessor(#[error(not(source))] String),
    #[display("filesystem error: {_0}")]
    Filesystem(#[error(not(source))] String),
    #[display("cache error")]
    Cache,
    /// The task scheduler did not accept a background task.
    #[display("task could not be scheduled")]
    Scheduler,
    /// The language tag is reserved for values the archive deduces itself.
    #[display("reserved language tag: {_0}")]
    ReservedLanguage(#[error(not(source))] String),
    /// A transaction was committed or rolled back without being started, or
    /// started twice.
    #[display("invalid transaction state")]
    Transaction,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY surfaces as a database error; so does a full disk.
        matches!(self, Self::Database | Self::Filesystem(_) | Self::Scheduler)
    }
}
