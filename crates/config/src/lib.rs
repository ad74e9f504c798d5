//! Layered configuration for the librarian archive.
//!
//! Sources are merged in order, later sources overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. `config.toml` in the platform configuration directory,
//! 3. an explicit file (TOML, YAML or JSON, picked by extension),
//! 4. `LIBRARIAN_*` environment variables, nested with `__`
//!    (`LIBRARIAN_ARCHIVE__CACHE_TTL=60`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "LIBRARIAN_";
const APPLICATION: &str = "librarian";
const CONFIG_FILE: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

fn data_dir() -> PathBuf {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    pub archive: ArchiveConfig,
    pub extract: ExtractConfig,
}

/// Where the FSAL serves files from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub root: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self { root: data_dir().join("library") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: data_dir().join("archive.sqlite") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Lifetime of cached filesystem rows, in seconds.
    pub cache_ttl: u64,
    /// Delay between scheduled sub-directory scans, in milliseconds.
    pub scan_step_delay: u64,
    /// Interval between change-detection passes, in seconds.
    pub refresh_rate: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { cache_ttl: 3600, scan_step_delay: 500, refresh_rate: 30 }
    }
}

impl ArchiveConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn scan_step_delay(&self) -> Duration {
        Duration::from_millis(self.scan_step_delay)
    }

    pub fn refresh_rate(&self) -> Duration {
        Duration::from_secs(self.refresh_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Explicit `ffprobe` binary; looked up on `PATH` when unset.
    pub ffprobe: Option<PathBuf>,
    /// Subprocess timeout, in milliseconds.
    pub timeout: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { ffprobe: None, timeout: 5000 }
    }
}

impl ExtractConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

impl Config {
    /// Load configuration from every source.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_from(Self::default_file(), explicit)
    }

    /// The platform-specific `config.toml`, if the platform has a config directory.
    pub fn default_file() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load configuration with an explicit choice of base file. A missing
    /// base file is skipped; a missing explicit file is an error.
    pub fn load_from(base: Option<PathBuf>, explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(base) = base {
            figment = figment.merge(Toml::file(base));
        }
        if let Some(file) = explicit {
            if !file.is_file() {
                exn::bail!(ErrorKind::Invalid(format!("config file {} does not exist", file.display())));
            }
            let extension = file.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
            figment = match extension.as_str() {
                "toml" => figment.merge(Toml::file(file)),
                "yaml" | "yml" => figment.merge(Yaml::file(file)),
                "json" => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::Invalid(format!("unsupported config format: {}", file.display()))),
            };
        }
        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(library = %config.library.root.display(), database = %config.database.path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive.cache_ttl == 0 {
            exn::bail!(ErrorKind::Invalid("archive.cache_ttl must be non-zero".to_string()));
        }
        if self.extract.timeout == 0 {
            exn::bail!(ErrorKind::Invalid("extract.timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}
