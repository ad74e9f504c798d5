//! Extraction Error Types
//!
//! Every kind here is a "metadata error": the file could not be turned into
//! metadata. Processors recover from all of them by keeping their content
//! type bit and leaving the metadata section empty.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The FSAL does not know the file.
    #[display("metadata extraction failed, file not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// No `ffprobe` binary configured or on `PATH`.
    #[display("ffprobe not detected on your system")]
    ProbeNotFound,
    /// The probe subprocess did not finish in time and was killed.
    #[display("metadata extraction timed out: {_0}")]
    Timeout(#[error(not(source))] String),
    /// The probe subprocess could not be run or produced no output.
    #[display("metadata extraction timed out or failed: {_0}")]
    Failed(#[error(not(source))] String),
    /// Output was produced but could not be parsed.
    #[display("metadata parsing failed: {_0}")]
    Malformed(#[error(not(source))] String),
    /// The file exists but could not be read.
    #[display("metadata extraction failed, error opening: {_0}")]
    Read(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A slow disk or a busy machine can push ffprobe past its deadline.
        matches!(self, Self::Timeout(_))
    }
}
