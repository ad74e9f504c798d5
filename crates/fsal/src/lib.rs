//! Client interface to the filesystem abstraction layer (FSAL).
//!
//! The FSAL owns the files; the archive only ever asks it what exists. Paths
//! passed to any [`Fsal`] method are library-relative and normalized with
//! [`path::normalize`] before use, so `"media/x.jpg"`, `"/media/x.jpg"` and
//! `"media/./x.jpg"` all address the same object.

pub mod error;
mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
pub mod path;

pub use crate::local::LocalFsal;
#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockFsal;
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub type FsalHandle = Arc<dyn Fsal>;

/// A file or directory as reported by the FSAL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsObject {
    /// Normalized library path, always with a leading `/`.
    pub rel_path: String,
    /// Absolute path on the host, for handing to subprocesses.
    pub path: PathBuf,
    pub is_dir: bool,
    /// Size in bytes; zero for directories.
    pub size: u64,
}

/// Result of listing a single directory, entries sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    pub dirs: Vec<FsObject>,
    pub files: Vec<FsObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change observed by the FSAL since the previous [`Fsal::get_changes`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    pub path: String,
    pub is_dir: bool,
    pub kind: ChangeKind,
}

/// Filesystem abstraction client.
// TODO: When `dyn async trait` stabilizes, migrate to native 2024 Edition async traits.
#[async_trait]
pub trait Fsal: Send + Sync {
    /// Human-readable identifier for this client (used in log output).
    fn name(&self) -> &str;

    /// List the direct children of a directory.
    async fn list_dir(&self, path: &str) -> Result<DirListing>;

    /// Look up a single object.
    async fn get_fso(&self, path: &str) -> Result<FsObject>;

    /// Whether `path` exists and is a directory. Errors count as `false`.
    async fn isdir(&self, path: &str) -> bool;

    /// Whether `path` exists. Errors count as `false`.
    async fn exists(&self, path: &str) -> bool;

    /// Read the whole of a (small) file.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Read a file as text, replacing invalid UTF-8 sequences.
    async fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drain changes recorded since the last call. Clients without a change
    /// feed report nothing.
    async fn get_changes(&self) -> Result<Vec<FsChange>> {
        Ok(Vec::new())
    }
}
