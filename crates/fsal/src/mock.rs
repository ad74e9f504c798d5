//! In-memory FSAL client for testing.

use crate::error::{ErrorKind, Result};
use crate::path;
use crate::{ChangeKind, DirListing, FsChange, FsObject, Fsal};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tokio::sync::RwLock;

const MOCK_ROOT: &str = "/mock";

#[derive(Default)]
struct State {
    files: BTreeMap<String, Vec<u8>>,
    /// Directories created explicitly; parents of files exist implicitly.
    dirs: BTreeSet<String>,
    changes: Vec<FsChange>,
}

impl State {
    fn is_dir(&self, key: &str) -> bool {
        key.is_empty()
            || self.dirs.contains(key)
            || self.files.keys().chain(self.dirs.iter()).any(|p| p.starts_with(key) && p[key.len()..].starts_with('/'))
    }

    fn all_dirs(&self) -> BTreeSet<String> {
        let mut dirs = self.dirs.clone();
        for entry in self.files.keys().chain(self.dirs.iter()) {
            let mut parent = path::dirname(entry);
            while !parent.is_empty() {
                dirs.insert(parent.to_string());
                parent = path::dirname(parent);
            }
        }
        dirs
    }
}

/// In-memory FSAL client for testing.
///
/// Files live in a map behind a [`RwLock`]; directories are implied by the
/// files beneath them (or added explicitly with [`MockFsal::with_dirs`]).
/// Changes pushed with [`MockFsal::push_change`] are handed out by
/// [`Fsal::get_changes`].
///
/// # Examples
///
/// ```
/// use librarian_fsal::{Fsal, MockFsal};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fsal = MockFsal::with_files([("media/cats/fluffy.jpg", b"jpeg")]);
/// assert!(fsal.isdir("/media/cats").await);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockFsal {
    state: RwLock<State>,
}

impl MockFsal {
    /// Create a mock client pre-populated with files.
    ///
    /// Panics if any path fails normalization; bad test setup should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Vec<u8>>)>) -> Self {
        let mut state = State::default();
        for (path, data) in files {
            state.files.insert(Self::key_or_panic(path.as_ref()), data.into());
        }
        Self { state: RwLock::new(state) }
    }

    /// Add empty directories.
    pub fn with_dirs(self, dirs: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut state = self.state.into_inner();
        for dir in dirs {
            state.dirs.insert(Self::key_or_panic(dir.as_ref()));
        }
        Self { state: RwLock::new(state) }
    }

    fn key_or_panic(path: &str) -> String {
        Self::normalize_or_panic(path).trim_start_matches('/').to_string()
    }

    fn normalize_or_panic(path: &str) -> String {
        let Ok(normalized) = path::normalize(path) else {
            panic!("MockFsal: invalid path {path:?}");
        };
        normalized
    }

    fn key(path: &str) -> Result<String> {
        Ok(path::normalize(path)?.trim_start_matches('/').to_string())
    }

    fn absolute(key: &str) -> PathBuf {
        PathBuf::from(MOCK_ROOT).join(key)
    }

    /// Write a file, recording a `Created` or `Modified` change.
    pub async fn write(&self, path: &str, data: impl Into<Vec<u8>>) {
        let path = Self::normalize_or_panic(path);
        let key = Self::key_or_panic(&path);
        let mut state = self.state.write().await;
        let kind = if state.files.contains_key(&key) { ChangeKind::Modified } else { ChangeKind::Created };
        state.files.insert(key, data.into());
        state.changes.push(FsChange { path, is_dir: false, kind });
    }

    /// Remove a file or a whole directory subtree, recording a `Deleted` change.
    /// Returns whether anything was removed.
    pub async fn remove(&self, path: &str) -> bool {
        let path = Self::normalize_or_panic(path);
        let key = Self::key_or_panic(&path);
        let mut state = self.state.write().await;
        let is_dir = state.is_dir(&key);
        let within = |p: &String| *p == key || (p.starts_with(&key) && p[key.len()..].starts_with('/'));
        let before = state.files.len() + state.dirs.len();
        state.files.retain(|p, _| !within(p));
        state.dirs.retain(|p| !within(p));
        let removed = before != state.files.len() + state.dirs.len();
        if removed {
            state.changes.push(FsChange { path, is_dir, kind: ChangeKind::Deleted });
        }
        removed
    }

    /// Record a change without touching the stored files.
    pub async fn push_change(&self, change: FsChange) {
        self.state.write().await.changes.push(change);
    }
}

#[async_trait]
impl Fsal for MockFsal {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_dir(&self, path: &str) -> Result<DirListing> {
        let dir = path::normalize(path)?;
        let key = dir.trim_start_matches('/');
        let state = self.state.read().await;
        if state.files.contains_key(key) {
            exn::bail!(ErrorKind::NotADirectory(dir));
        }
        if !state.is_dir(key) {
            exn::bail!(ErrorKind::NotFound(dir));
        }
        let mut listing = DirListing::default();
        for child in state.all_dirs().iter().filter(|d| path::dirname(d) == key) {
            listing.dirs.push(FsObject {
                rel_path: path::join(&dir, path::basename(child))?,
                path: Self::absolute(child),
                is_dir: true,
                size: 0,
            });
        }
        for (child, data) in state.files.iter().filter(|(f, _)| path::dirname(f) == key) {
            listing.files.push(FsObject {
                rel_path: path::join(&dir, path::basename(child))?,
                path: Self::absolute(child),
                is_dir: false,
                size: data.len() as u64,
            });
        }
        Ok(listing)
    }

    async fn get_fso(&self, path: &str) -> Result<FsObject> {
        let rel_path = path::normalize(path)?;
        let key = rel_path.trim_start_matches('/').to_string();
        let state = self.state.read().await;
        if let Some(data) = state.files.get(&key) {
            return Ok(FsObject { path: Self::absolute(&key), rel_path, is_dir: false, size: data.len() as u64 });
        }
        if state.is_dir(&key) {
            return Ok(FsObject { path: Self::absolute(&key), rel_path, is_dir: true, size: 0 });
        }
        exn::bail!(ErrorKind::NotFound(rel_path))
    }

    async fn isdir(&self, path: &str) -> bool {
        self.get_fso(path).await.is_ok_and(|fso| fso.is_dir)
    }

    async fn exists(&self, path: &str) -> bool {
        self.get_fso(path).await.is_ok()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let key = Self::key(path)?;
        let state = self.state.read().await;
        match state.files.get(&key) {
            Some(data) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::NotFound(path.to_string())),
        }
    }

    async fn get_changes(&self) -> Result<Vec<FsChange>> {
        Ok(std::mem::take(&mut self.state.write().await.changes))
    }
}
