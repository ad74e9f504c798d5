//! Processors pair a content type with the extractor that reads it.
//!
//! Every path is handled by the generic processor plus whichever others
//! accept it; each one ORs its bit into the path's record and merges in the
//! metadata its extractor finds.

use crate::contenttypes::{self, ContentType, ContentTypes};
use crate::error::{ErrorKind, Result};
use crate::links::LinkIndex;
use crate::record::{AUTO_LANGUAGE, EntryType, Record};
use exn::OptionExt;
use librarian_config::ExtractConfig;
use librarian_extract::{
    AudioExtractor, DIRINFO_FILENAME, DirInfoExtractor, Extractor, FfProbe, HtmlExtractor, ImageExtractor, Prober,
    Section, VideoExtractor,
};
use librarian_fsal::{Fsal, path};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Candidate entry points, best first.
const ENTRY_POINTS: &[&str] = &[
    "index.html",
    "main.html",
    "start.html",
    "index.htm",
    "main.htm",
    "start.htm",
    "index.xhtml",
    "main.xhtml",
    "start.xhtml",
];

#[derive(Clone)]
pub struct Processor {
    content_type: ContentType,
    extractor: Option<Arc<dyn Extractor>>,
}

impl Processor {
    fn new(content_type: ContentType, extractor: Option<Arc<dyn Extractor>>) -> Self {
        Self { content_type, extractor }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn can_process(&self, path: &str) -> bool {
        match self.content_type {
            ContentType::Generic => true,
            ContentType::Directory => path::basename(path) == DIRINFO_FILENAME,
            _ => {
                let Some(extension) = path::extension(path) else {
                    return false;
                };
                self.extractor.as_ref().is_some_and(|e| e.extensions().contains(&extension.as_str()))
            },
        }
    }

    /// The record a processed path's output belongs to. Directory
    /// descriptors describe the directory they sit in.
    pub fn target_path<'a>(&self, path: &'a str) -> &'a str {
        match self.content_type {
            ContentType::Directory => path::dirname(path),
            _ => path,
        }
    }

    /// Whether `new` would make a better default view for its directory
    /// than `old`. Only HTML documents are ever entry points.
    ///
    /// Any ranked candidate beats no candidate; an unranked `new` never
    /// wins; equal ranks keep `old`. Names are compared exactly, so
    /// `INDEX.HTML` is not a candidate.
    pub fn is_entry_point(&self, new: &str, old: Option<&str>) -> bool {
        if self.content_type != ContentType::Html {
            return false;
        }
        let rank = |candidate: &str| {
            let name = path::basename(candidate);
            ENTRY_POINTS.iter().position(|entry| *entry == name)
        };
        match (rank(new), old.and_then(rank)) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(new), Some(old)) => new < old,
        }
    }

    /// Merge this processor's view of `path` into `records`.
    ///
    /// A partial pass stamps the content type bit and mime type only: no
    /// extraction, no filesystem lookups, no link index updates. Extraction
    /// failures leave the bit set and the metadata untouched.
    pub(crate) async fn process(
        &self,
        fsal: &dyn Fsal,
        links: &LinkIndex,
        path: &str,
        partial: bool,
        records: &mut BTreeMap<String, Record>,
    ) -> Result<()> {
        let (metadata, assets) = match (&self.extractor, partial) {
            (Some(extractor), false) => match extractor.extract(fsal, path).await {
                Ok(extraction) => (self.admitted(extraction.metadata.into_languages()), extraction.assets),
                Err(err) => {
                    tracing::debug!(path, content_type = %self.content_type, error = ?err, "metadata extraction failed");
                    (BTreeMap::new(), Vec::new())
                },
            },
            _ => (BTreeMap::new(), Vec::new()),
        };
        let entry_type = match self.content_type {
            ContentType::Directory => Some(EntryType::Directory),
            _ if partial => None,
            _ => Some(if fsal.isdir(path).await { EntryType::Directory } else { EntryType::File }),
        };

        let target = self.target_path(path);
        let record = records.entry(target.to_string()).or_insert_with(|| Record::new(target));
        record.content_types |= self.content_type.flag() | ContentTypes::GENERIC;
        if let Some(entry_type) = entry_type {
            record.entry_type = entry_type;
        }
        record.mime_type = match record.entry_type {
            EntryType::Directory => None,
            EntryType::File => mime_guess::from_path(path).first().map(|mime| mime.essence_str().to_string()),
        };
        for (language, section) in metadata {
            record.metadata.entry(language).or_default().extend(section);
        }

        if self.content_type == ContentType::Html && !partial {
            links.update(path, &assets, true).await?;
        }
        Ok(())
    }

    /// Undo side effects of [`process`](Self::process) for a path that is
    /// going away.
    pub(crate) async fn deprocess(&self, links: &LinkIndex, path: &str) -> Result<()> {
        if self.content_type == ContentType::Html {
            links.remove(path, None).await?;
        }
        Ok(())
    }

    /// Extracted values as stored text, restricted to this processor's keys.
    /// Empty sections and the reserved language are dropped.
    fn admitted(&self, languages: BTreeMap<String, Section>) -> BTreeMap<String, BTreeMap<String, String>> {
        let keys = contenttypes::keys(Some(self.content_type));
        languages
            .into_iter()
            .filter(|(language, _)| language != AUTO_LANGUAGE)
            .map(|(language, section)| {
                let section: BTreeMap<_, _> = section
                    .into_iter()
                    .filter(|(key, _)| keys.contains_key(key.as_str()))
                    .map(|(key, value)| (key, value.to_string()))
                    .collect();
                (language, section)
            })
            .filter(|(_, section)| !section.is_empty())
            .collect()
    }
}

/// The fixed set of processors, in the order they run on a path.
#[derive(Clone)]
pub struct Processors {
    processors: Arc<[Processor]>,
}

impl Processors {
    /// Processors with media extraction through `ffprobe`.
    pub fn new(config: &ExtractConfig) -> Self {
        Self::with_prober(Arc::new(FfProbe::from_config(config)))
    }

    pub fn with_prober(prober: Arc<dyn Prober>) -> Self {
        let processors = vec![
            Processor::new(ContentType::Generic, None),
            Processor::new(ContentType::Html, Some(Arc::new(HtmlExtractor))),
            Processor::new(ContentType::Video, Some(Arc::new(VideoExtractor::new(prober.clone())))),
            Processor::new(ContentType::Audio, Some(Arc::new(AudioExtractor::new(prober.clone())))),
            Processor::new(ContentType::Image, Some(Arc::new(ImageExtractor::new(prober)))),
            Processor::new(ContentType::Directory, Some(Arc::new(DirInfoExtractor))),
        ];
        Self { processors: processors.into() }
    }

    /// Every processor that accepts `path`, generic first.
    pub fn for_path(&self, path: &str) -> Result<Vec<&Processor>> {
        let matching: Vec<_> = self.processors.iter().filter(|p| p.can_process(path)).collect();
        if matching.is_empty() {
            exn::bail!(ErrorKind::NoProcessor(path.to_string()));
        }
        Ok(matching)
    }

    pub fn for_type(&self, content_type: ContentType) -> Result<&Processor> {
        self.processors
            .iter()
            .find(|p| p.content_type == content_type)
            .ok_or_raise(|| ErrorKind::UnknownContentType(content_type.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Processor> {
        self.processors.iter()
    }
}
