//! Content metadata archive.
//!
//! Mirrors a file library into SQLite: one row per file or directory, a
//! bitmask of content types per row, and per-language metadata extracted by
//! the content processors. The library itself is reached only through an
//! FSAL client; the database can always be rebuilt from it.
//!
//! ```no_run
//! use librarian_archive::{Archive, Database, GetOptions};
//! use librarian_config::Config;
//!
//! # async fn run() -> librarian_archive::Result<()> {
//! let config = Config::default();
//! let db = Database::connect(&config.database.path).await?;
//! let archive = Archive::builder(&db, &config).build()?;
//! archive.clear_and_reload().await?;
//! let found = archive.get("/music/song.mp3", GetOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

mod archive;
mod batch;
pub mod contenttypes;
mod db;
pub mod error;
pub mod exts;
mod fswriter;
mod links;
mod models;
mod processor;
mod record;
mod store;
mod wrapper;

pub use crate::archive::{Analysis, Archive, ArchiveBuilder, Callback, GetOptions, Refresh, ScanOptions, callback};
pub use crate::batch::IntoPaths;
pub use crate::contenttypes::{ContentType, ContentTypes};
pub use crate::db::Database;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::links::LinkIndex;
pub use crate::processor::{Processor, Processors};
pub use crate::record::{AUTO_LANGUAGE, EntryType, FsEntry, Metadata, Record};
pub use crate::wrapper::MetaWrapper;
pub use librarian_extract::Value;
