//! Metadata extractors.
//!
//! An [`Extractor`] reads one file through the FSAL and turns it into
//! [`Extraction`]: typed values, optionally per language, plus any local
//! assets the file references. Extractors never touch the database.

mod consts;
mod dirinfo;
pub mod error;
mod html;
mod media;
mod probe;
mod value;

pub use crate::consts::{DEFAULT_COVER, DIRINFO_FILENAME};
pub use crate::dirinfo::DirInfoExtractor;
use crate::error::Result;
pub use crate::html::HtmlExtractor;
pub use crate::media::{AudioExtractor, ImageExtractor, VideoExtractor};
#[cfg(any(test, feature = "mock"))]
pub use crate::probe::CannedProber;
pub use crate::probe::{FfProbe, Prober};
pub use crate::value::{Extracted, Extraction, NO_LANGUAGE, Section, Value};
use async_trait::async_trait;
use librarian_fsal::Fsal;

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Lower-cased extensions (without the dot) this extractor accepts.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether [`extract`](Self::extract) reports values per language.
    fn multilang(&self) -> bool {
        false
    }

    async fn extract(&self, fsal: &dyn Fsal, path: &str) -> Result<Extraction>;
}
