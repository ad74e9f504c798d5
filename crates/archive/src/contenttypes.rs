//! The content type registry.
//!
//! Every filesystem entry carries a [`ContentTypes`] bitmask. The registry
//! maps tag names to bits, and lists the metadata keys each tag admits along
//! with how their stored text is read back.

use crate::error::{ErrorKind, Result};
use bitflags::bitflags;
use exn::ResultExt;
use librarian_extract::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

bitflags! {
    /// A set of content types. [`GENERIC`](Self::GENERIC) is set on every
    /// stored entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ContentTypes: u32 {
        const GENERIC = 1;
        const HTML = 1 << 1;
        const VIDEO = 1 << 2;
        const AUDIO = 1 << 3;
        const IMAGE = 1 << 4;
        const DIRECTORY = 1 << 5;
    }
}

impl ContentTypes {
    /// Tag names of every set bit, in ascending bit order.
    pub fn names(self) -> Vec<&'static str> {
        from_bitmask(self)
    }

    pub(crate) fn from_db(bits: i64) -> Result<Self> {
        let bits = u32::try_from(bits).or_raise(|| ErrorKind::InvalidData(format!("bitmask {bits}")))?;
        Ok(Self::from_bits_retain(bits))
    }

    pub(crate) fn to_db(self) -> i64 {
        i64::from(self.bits())
    }
}

/// A single content type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentType {
    Generic,
    Html,
    Video,
    Audio,
    Image,
    Directory,
}

impl ContentType {
    /// Every tag, in ascending bit order.
    pub const ALL: [Self; 6] = [Self::Generic, Self::Html, Self::Video, Self::Audio, Self::Image, Self::Directory];

    pub fn name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Html => "html",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Directory => "directory",
        }
    }

    pub fn flag(self) -> ContentTypes {
        match self {
            Self::Generic => ContentTypes::GENERIC,
            Self::Html => ContentTypes::HTML,
            Self::Video => ContentTypes::VIDEO,
            Self::Audio => ContentTypes::AUDIO,
            Self::Image => ContentTypes::IMAGE,
            Self::Directory => ContentTypes::DIRECTORY,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContentType {
    type Err = crate::error::Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| exn::Exn::from(ErrorKind::UnknownContentType(name.to_string())))
    }
}

impl From<ContentType> for ContentTypes {
    fn from(tag: ContentType) -> Self {
        tag.flag()
    }
}

/// How a stored metadata value is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    Integer,
    Float,
    Boolean,
}

impl Coercion {
    /// `None` when `raw` does not parse as the target type.
    pub fn coerce(self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            Self::Text => Some(Value::from(raw)),
            Self::Integer => raw.parse().ok().map(Value::Integer),
            Self::Float => raw.parse().ok().map(Value::Float),
            Self::Boolean => match raw {
                "1" | "true" | "True" => Some(Value::Boolean(true)),
                "0" | "false" | "False" => Some(Value::Boolean(false)),
                _ => None,
            },
        }
    }
}

use Coercion::{Boolean, Float, Integer, Text};

const GENERIC_KEYS: &[(&str, Coercion)] = &[("name", Text)];
const HTML_KEYS: &[(&str, Coercion)] = &[
    ("author", Text),
    ("title", Text),
    ("description", Text),
    ("keywords", Text),
    ("language", Text),
    ("copyright", Text),
    ("outernet-styling", Text),
    ("outernet_formatting", Boolean),
];
const VIDEO_KEYS: &[(&str, Coercion)] = &[
    ("author", Text),
    ("title", Text),
    ("description", Text),
    ("width", Integer),
    ("height", Integer),
    ("duration", Float),
];
const AUDIO_KEYS: &[(&str, Coercion)] = &[
    ("author", Text),
    ("title", Text),
    ("album", Text),
    ("genre", Text),
    ("duration", Float),
    ("cover", Text),
];
const IMAGE_KEYS: &[(&str, Coercion)] = &[("title", Text), ("width", Integer), ("height", Integer)];
const DIRECTORY_KEYS: &[(&str, Coercion)] = &[
    ("view", Text),
    ("icon", Text),
    ("main", Text),
    ("name", Text),
    ("description", Text),
    ("cover", Text),
    ("publisher", Text),
    ("keywords", Text),
];

const fn type_keys(tag: ContentType) -> &'static [(&'static str, Coercion)] {
    match tag {
        ContentType::Generic => GENERIC_KEYS,
        ContentType::Html => HTML_KEYS,
        ContentType::Video => VIDEO_KEYS,
        ContentType::Audio => AUDIO_KEYS,
        ContentType::Image => IMAGE_KEYS,
        ContentType::Directory => DIRECTORY_KEYS,
    }
}

const fn type_search_keys(tag: ContentType) -> &'static [&'static str] {
    match tag {
        ContentType::Generic => &["name"],
        ContentType::Html => &["author", "title", "description", "keywords"],
        ContentType::Video => &["author", "title", "description"],
        ContentType::Audio => &["author", "title", "genre", "album"],
        ContentType::Image => &["title"],
        ContentType::Directory => &["name", "description", "publisher", "keywords"],
    }
}

/// OR of each name's bit. Fails on the first unknown name.
pub fn to_bitmask(names: impl IntoIterator<Item = impl AsRef<str>>) -> Result<ContentTypes> {
    names.into_iter().try_fold(ContentTypes::empty(), |mask, name| -> Result<ContentTypes> {
        Ok(mask | name.as_ref().parse::<ContentType>()?.flag())
    })
}

/// Names of the tags set in `mask`, in ascending bit order.
pub fn from_bitmask(mask: ContentTypes) -> Vec<&'static str> {
    ContentType::ALL.into_iter().filter(|tag| mask.contains(tag.flag())).map(ContentType::name).collect()
}

pub fn is_valid(name: &str) -> bool {
    name.parse::<ContentType>().is_ok()
}

pub fn names() -> Vec<&'static str> {
    ContentType::ALL.into_iter().map(ContentType::name).collect()
}

/// Metadata keys valid for `tag`, or for any tag when `None`.
pub fn keys(tag: Option<ContentType>) -> BTreeMap<&'static str, Coercion> {
    match tag {
        Some(tag) => type_keys(tag).iter().copied().collect(),
        None => ContentType::ALL.into_iter().flat_map(|tag| type_keys(tag).iter().copied()).collect(),
    }
}

/// Union of the keys admitted by every tag set in `mask`.
pub fn keys_for(mask: ContentTypes) -> BTreeSet<&'static str> {
    ContentType::ALL
        .into_iter()
        .filter(|tag| mask.contains(tag.flag()))
        .flat_map(|tag| type_keys(tag).iter().map(|(key, _)| *key))
        .collect()
}

/// Keys worth matching search terms against, for `tag` or for any tag.
pub fn search_keys(tag: Option<ContentType>) -> Vec<&'static str> {
    match tag {
        Some(tag) => type_search_keys(tag).to_vec(),
        None => {
            let all: BTreeSet<_> = ContentType::ALL.into_iter().flat_map(type_search_keys).copied().collect();
            all.into_iter().collect()
        },
    }
}

/// How values stored under `key` are read back. Unregistered keys stay text.
pub fn coercion(key: &str) -> Coercion {
    ContentType::ALL
        .into_iter()
        .flat_map(|tag| type_keys(tag).iter())
        .find(|(name, _)| *name == key)
        .map_or(Coercion::Text, |(_, coercion)| *coercion)
}
