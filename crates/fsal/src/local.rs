//! Local filesystem FSAL client.
//!
//! Serves a directory on the local disk through `tokio::fs`. All paths are
//! relative to the configured root directory.

use crate::error::{ErrorKind, Result};
use crate::path;
use crate::{DirListing, FsObject, Fsal};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem FSAL client.
///
/// # Examples
///
/// ```no_run
/// use librarian_fsal::LocalFsal;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fsal = LocalFsal::new("/srv/library")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalFsal {
    root: PathBuf,
}

impl LocalFsal {
    /// Create a new client serving `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let display = root.display().to_string();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(display));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::NotADirectory(display));
            }
        } else {
            // Only happens once on start-up; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &display))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, normalized: &str) -> PathBuf {
        self.root.join(normalized.trim_start_matches('/'))
    }

    fn map_io_error(e: std::io::Error, path: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_string()),
            std::io::ErrorKind::NotADirectory => ErrorKind::NotADirectory(path.to_string()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl Fsal for LocalFsal {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_dir(&self, path: &str) -> Result<DirListing> {
        let dir = path::normalize(path)?;
        let absolute = self.absolute_path(&dir);
        let metadata = fs::metadata(&absolute).await.map_err(|e| Self::map_io_error(e, &dir))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(dir));
        }
        let mut entries = fs::read_dir(&absolute).await.map_err(|e| Self::map_io_error(e, &dir))?;
        let mut listing = DirListing::default();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &dir))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follows symlinks; a broken one has no metadata and is skipped.
            let Ok(metadata) = fs::metadata(entry.path()).await else {
                continue;
            };
            let object = FsObject {
                rel_path: path::join(&dir, &name)?,
                path: entry.path(),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            };
            if object.is_dir {
                listing.dirs.push(object);
            } else if metadata.is_file() {
                listing.files.push(object);
            }
        }
        listing.dirs.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        listing.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(listing)
    }

    async fn get_fso(&self, path: &str) -> Result<FsObject> {
        let rel_path = path::normalize(path)?;
        let absolute = self.absolute_path(&rel_path);
        let metadata = fs::metadata(&absolute).await.map_err(|e| Self::map_io_error(e, &rel_path))?;
        Ok(FsObject {
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            path: absolute,
            rel_path,
        })
    }

    async fn isdir(&self, path: &str) -> bool {
        self.get_fso(path).await.is_ok_and(|fso| fso.is_dir)
    }

    async fn exists(&self, path: &str) -> bool {
        let Ok(normalized) = path::normalize(path) else {
            return false;
        };
        fs::try_exists(self.absolute_path(&normalized)).await.unwrap_or(false)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let normalized = path::normalize(path)?;
        Ok(fs::read(self.absolute_path(&normalized)).await.map_err(|e| Self::map_io_error(e, &normalized))?)
    }
}
