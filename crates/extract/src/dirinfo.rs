//! Directory descriptor (`.dirinfo`) files.
//!
//! One `key=value` per line; `key[lang]=value` scopes the value to a language.
//!
//! ```text
//! name=Cat pictures
//! name[fr]=Photos de chats
//! icon=cat.png
//! ```

use crate::consts::{self, DEFAULT_COVER};
use crate::error::{ErrorKind, Result};
use crate::value::{Extraction, Extracted, NO_LANGUAGE, Section, Value};
use crate::Extractor;
use async_trait::async_trait;
use exn::ResultExt;
use librarian_fsal::{Fsal, path};
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, Default, Clone, Copy)]
pub struct DirInfoExtractor;

impl DirInfoExtractor {
    fn parse(text: &str) -> BTreeMap<String, Section> {
        let mut data: BTreeMap<String, Section> = BTreeMap::new();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                if !line.trim().is_empty() {
                    tracing::debug!(line, "skipping descriptor line without '='");
                }
                continue;
            };
            let key = key.trim();
            let (key, language) = consts::DIRINFO_KEY_REGEX
                .captures(key)
                .and_then(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
                .unwrap_or((key, NO_LANGUAGE));
            if key.is_empty() {
                continue;
            }
            data.entry(language.to_string())
                .or_default()
                .insert(key.to_string(), Value::from(value.trim()));
        }
        data
    }
}

#[async_trait]
impl Extractor for DirInfoExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn multilang(&self) -> bool {
        true
    }

    #[instrument(name = "extract_dirinfo", skip(self, fsal))]
    async fn extract(&self, fsal: &dyn Fsal, path: &str) -> Result<Extraction> {
        let text = fsal.read_to_string(path).await.or_raise(|| ErrorKind::Read(path.to_string()))?;
        let mut data = Self::parse(&text);
        let has_cover = data.get(NO_LANGUAGE).and_then(|s| s.get("cover")).is_some_and(|c| !c.to_string().is_empty());
        if !has_cover
            && let Ok(cover) = path::join(path::dirname(path), DEFAULT_COVER)
            && fsal.exists(&cover).await
        {
            // Relative to the directory being described.
            data.entry(NO_LANGUAGE.to_string())
                .or_default()
                .insert("cover".to_string(), Value::from(DEFAULT_COVER));
        }
        Ok(Extraction { metadata: Extracted::Multilang(data), assets: Vec::new() })
    }
}
