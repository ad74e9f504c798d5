//! Running `ffprobe` against media files.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use librarian_config::ExtractConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::instrument;

/// Produces raw JSON describing a media file.
///
/// `entries` are the `-show_entries` sections to report (`format`, `streams`,
/// `frames`).
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path, entries: &[&str]) -> Result<Vec<u8>>;
}

/// The `ffprobe` command-line tool.
#[derive(Debug, Clone)]
pub struct FfProbe {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl FfProbe {
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Use the configured binary, or whatever `ffprobe` is on `PATH`.
    pub fn from_config(config: &ExtractConfig) -> Self {
        let binary = config.ffprobe.clone().or_else(|| which::which("ffprobe").ok());
        if binary.is_none() {
            tracing::info!("ffprobe not found in PATH; media files will be indexed without metadata");
        }
        Self::new(binary, config.timeout())
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn command(binary: &Path, path: &Path, entries: &[&str]) -> Command {
        let mut command = Command::new(binary);
        command
            .args(["-v", "quiet", "-i"])
            .arg(path)
            .args(["-show_entries", &entries.join(":"), "-print_format", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            // Dropping the pending output future on timeout kills the child.
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Prober for FfProbe {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn probe(&self, path: &Path, entries: &[&str]) -> Result<Vec<u8>> {
        let Some(binary) = &self.binary else {
            exn::bail!(ErrorKind::ProbeNotFound);
        };
        let display = path.display().to_string();
        let child = Self::command(binary, path, entries).spawn().or_raise(|| ErrorKind::Failed(display.clone()))?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.or_raise(|| ErrorKind::Failed(display.clone()))?,
            Err(_elapsed) => {
                tracing::debug!(timeout = ?self.timeout, "ffprobe killed after timeout");
                exn::bail!(ErrorKind::Timeout(display));
            },
        };
        if output.stdout.is_empty() {
            exn::bail!(ErrorKind::Failed(display));
        }
        Ok(output.stdout)
    }
}

/// A [`Prober`] answering from recorded `ffprobe` output.
///
/// Responses are matched by suffix of the absolute path; anything unmatched
/// gets the fallback, or a timeout when there is none.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone, Default)]
pub struct CannedProber {
    responses: Vec<(String, Vec<u8>)>,
    fallback: Option<Vec<u8>>,
}

#[cfg(any(test, feature = "mock"))]
impl CannedProber {
    /// Answer every probe with `output`.
    pub fn json(output: impl Into<Vec<u8>>) -> Self {
        Self { responses: Vec::new(), fallback: Some(output.into()) }
    }

    /// Time out on every probe.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Answer probes of paths ending in `suffix` with `output`.
    pub fn with(mut self, suffix: impl Into<String>, output: impl Into<Vec<u8>>) -> Self {
        self.responses.push((suffix.into(), output.into()));
        self
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl Prober for CannedProber {
    async fn probe(&self, path: &Path, _entries: &[&str]) -> Result<Vec<u8>> {
        let display = path.display().to_string();
        self.responses
            .iter()
            .find(|(suffix, _)| display.ends_with(suffix.as_str()))
            .map(|(_, output)| output)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::Timeout(display)))
    }
}
