//! Image, audio and video metadata via `ffprobe`.

use crate::error::{ErrorKind, Result};
use crate::probe::Prober;
use crate::value::{Extraction, Section, Value};
use crate::Extractor;
use async_trait::async_trait;
use exn::ResultExt;
use librarian_fsal::Fsal;
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

const MEDIA_ENTRIES: &[&str] = &["format", "streams"];
const IMAGE_ENTRIES: &[&str] = &["frames"];

/// Tag lookups shared by audio and video: output key, then the container tags
/// to try in order.
const AV_TAGS: &[(&str, &[&str])] =
    &[("title", &["title"]), ("author", &["author", "artist"]), ("description", &["description", "comment"])];
const AUDIO_TAGS: &[(&str, &[&str])] = &[("genre", &["genre"]), ("album", &["album"])];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProbeOutput {
    format: Format,
    streams: Vec<Stream>,
    frames: Vec<Map<String, Json>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Format {
    duration: Option<String>,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Stream {
    duration: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
}

impl ProbeOutput {
    fn format_tag(&self, tags: &[&str]) -> Option<&str> {
        tags.iter().find_map(|tag| self.format.tags.get(*tag)).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Container duration, or the longest stream when the container has none.
    fn duration(&self) -> f64 {
        if let Some(duration) = self.format.duration.as_deref().and_then(|d| d.parse::<f64>().ok()) {
            return duration;
        }
        self.streams
            .iter()
            .filter_map(|s| s.duration.as_deref().and_then(|d| d.parse::<f64>().ok()))
            .fold(0.0, f64::max)
    }

    /// Dimensions of the last stream reporting them.
    fn dimensions(&self) -> (i64, i64) {
        self.streams.iter().fold((0, 0), |(width, height), stream| {
            (stream.width.unwrap_or(width), stream.height.unwrap_or(height))
        })
    }

    /// First frame carrying any of `tags`, either directly or in its `tags` map.
    fn frame_tag(&self, tags: &[&str]) -> Option<&Json> {
        for frame in &self.frames {
            let frame_tags = frame.get("tags").and_then(Json::as_object);
            for tag in tags {
                if let Some(value) = frame.get(*tag) {
                    return Some(value);
                }
                if let Some(value) = frame_tags.and_then(|t| t.get(*tag)) {
                    return Some(value);
                }
            }
        }
        None
    }
}

fn json_integer(value: Option<&Json>) -> i64 {
    match value {
        Some(Json::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Json::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

fn json_text(value: Option<&Json>) -> Option<String> {
    match value {
        Some(Json::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Json::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

async fn probe(prober: &dyn Prober, fsal: &dyn Fsal, path: &str, entries: &[&str]) -> Result<ProbeOutput> {
    let fso = fsal.get_fso(path).await.or_raise(|| ErrorKind::NotFound(path.to_string()))?;
    let raw = prober.probe(&fso.path, entries).await?;
    serde_json::from_slice(&raw).or_raise(|| ErrorKind::Malformed(path.to_string()))
}

fn audio_video(output: &ProbeOutput, extra: &[(&str, &[&str])]) -> Section {
    let mut section = Section::new();
    for (key, tags) in AV_TAGS.iter().chain(extra) {
        if let Some(value) = output.format_tag(tags) {
            section.insert(key.to_string(), Value::from(value));
        }
    }
    let (width, height) = output.dimensions();
    section.insert("duration".to_string(), Value::Float(output.duration()));
    section.insert("width".to_string(), Value::Integer(width));
    section.insert("height".to_string(), Value::Integer(height));
    section
}

pub struct ImageExtractor {
    prober: Arc<dyn Prober>,
}

impl ImageExtractor {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }
}

#[async_trait]
impl Extractor for ImageExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["jpg", "jpeg", "png"]
    }

    #[instrument(name = "extract_image", skip(self, fsal))]
    async fn extract(&self, fsal: &dyn Fsal, path: &str) -> Result<Extraction> {
        let output = probe(self.prober.as_ref(), fsal, path, IMAGE_ENTRIES).await?;
        let mut section = Section::new();
        if let Some(title) = json_text(output.frame_tag(&["title", "ImageDescription"])) {
            section.insert("title".to_string(), Value::Text(title));
        }
        section.insert("width".to_string(), Value::Integer(json_integer(output.frame_tag(&["width"]))));
        section.insert("height".to_string(), Value::Integer(json_integer(output.frame_tag(&["height"]))));
        Ok(Extraction::flat(section))
    }
}

pub struct AudioExtractor {
    prober: Arc<dyn Prober>,
}

impl AudioExtractor {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }
}

#[async_trait]
impl Extractor for AudioExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["mp3", "wav", "ogg"]
    }

    #[instrument(name = "extract_audio", skip(self, fsal))]
    async fn extract(&self, fsal: &dyn Fsal, path: &str) -> Result<Extraction> {
        let output = probe(self.prober.as_ref(), fsal, path, MEDIA_ENTRIES).await?;
        Ok(Extraction::flat(audio_video(&output, AUDIO_TAGS)))
    }
}

pub struct VideoExtractor {
    prober: Arc<dyn Prober>,
}

impl VideoExtractor {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }
}

#[async_trait]
impl Extractor for VideoExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["mp4", "wmv", "webm", "flv", "ogv"]
    }

    #[instrument(name = "extract_video", skip(self, fsal))]
    async fn extract(&self, fsal: &dyn Fsal, path: &str) -> Result<Extraction> {
        let output = probe(self.prober.as_ref(), fsal, path, MEDIA_ENTRIES).await?;
        Ok(Extraction::flat(audio_video(&output, &[])))
    }
}
