//! HTML document metadata and local asset references.

use crate::consts;
use crate::error::{ErrorKind, Result};
use crate::value::{Extraction, Extracted, Section, Value};
use crate::Extractor;
use async_trait::async_trait;
use exn::ResultExt;
use librarian_fsal::{Fsal, path};
use scraper::Html;
use std::collections::HashSet;
use tracing::instrument;

const FORMATTING_KEY: &str = "outernet_formatting";
const STYLING_KEY: &str = "outernet-styling";

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    /// Collect metadata from a parsed document.
    ///
    /// Every `<meta name content>` pair is reported as-is; keys that no content
    /// type admits are dropped later. `<html lang>` beats
    /// `http-equiv=content-language`, which beats `<meta name=language>`.
    fn metadata(document: &Html) -> Section {
        let mut data = Section::new();
        for meta in document.select(&consts::META_SELECTOR) {
            let element = meta.value();
            if let (Some(name), Some(content)) = (element.attr("name"), element.attr("content")) {
                data.insert(name.to_string(), Value::from(content));
            }
            if element.attr("http-equiv").is_some_and(|p| p.eq_ignore_ascii_case("content-language"))
                && let Some(content) = element.attr("content")
            {
                data.insert("language".to_string(), Value::from(content));
            }
        }
        if let Some(html) = document.select(&consts::HTML_SELECTOR).next()
            && let Some(lang) = html.value().attr("lang").map(str::trim).filter(|l| !l.is_empty())
        {
            data.insert("language".to_string(), Value::from(lang));
        }
        if data.get("language").is_some_and(|l| l.to_string().trim().is_empty()) {
            data.remove("language");
        }
        if let Some(title) = document.select(&consts::TITLE_SELECTOR).next() {
            let title = title.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                data.insert("title".to_string(), Value::Text(title));
            }
        }
        let formatting = Self::formatting(&data);
        data.insert(FORMATTING_KEY.to_string(), Value::Boolean(formatting));
        data
    }

    /// Whether the page asks for library styling, either through an explicit
    /// `outernet_formatting=true` or by naming a stylesheet in
    /// `outernet-styling`.
    fn formatting(data: &Section) -> bool {
        if let Some(flag) = data.get(FORMATTING_KEY) {
            return *flag == Value::from("true");
        }
        data.get(STYLING_KEY).is_some_and(|v| !v.to_string().trim().is_empty())
    }

    /// Library paths of every local file the document points at, resolved
    /// against the document's directory, in document order without repeats.
    fn assets(document: &Html, path: &str) -> Vec<String> {
        let directory = path::dirname(path);
        let references = [
            (&*consts::LINK_SELECTOR, "href"),
            (&*consts::SCRIPT_SELECTOR, "src"),
            (&*consts::IMG_SELECTOR, "src"),
            (&*consts::ANCHOR_SELECTOR, "href"),
        ];
        let mut seen = HashSet::new();
        let mut assets = Vec::new();
        for (selector, attribute) in references {
            for element in document.select(selector) {
                if let Some(url) = element.value().attr(attribute)
                    && let Some(local) = Self::local_path(url)
                    && let Ok(resolved) = path::join(directory, local)
                    && seen.insert(resolved.clone())
                {
                    assets.push(resolved);
                }
            }
        }
        assets
    }

    /// The path part of a URL that refers to a local file. Remote URLs,
    /// protocol-relative URLs and bare fragments have none.
    fn local_path(url: &str) -> Option<&str> {
        let url = url.trim();
        if consts::URL_SCHEME_REGEX.is_match(url) || url.starts_with("//") {
            return None;
        }
        let end = url.find(['?', '#']).unwrap_or(url.len());
        Some(&url[..end]).filter(|p| !p.is_empty())
    }
}

#[async_trait]
impl Extractor for HtmlExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm", "xhtml"]
    }

    #[instrument(name = "extract_html", skip(self, fsal))]
    async fn extract(&self, fsal: &dyn Fsal, path: &str) -> Result<Extraction> {
        let html = fsal.read_to_string(path).await.or_raise(|| ErrorKind::Read(path.to_string()))?;
        let document = Html::parse_document(&html);
        Ok(Extraction { metadata: Extracted::Flat(Self::metadata(&document)), assets: Self::assets(&document, path) })
    }
}
