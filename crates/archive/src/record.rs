use crate::contenttypes::ContentTypes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Language bucket the archive writes deduced values into, such as a
/// directory's elected entry point. Callers may not save under it.
pub const AUTO_LANGUAGE: &str = "__auto__";

/// `{language: {key: value}}`, with `""` for values without a language.
pub type Metadata = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    #[default]
    File,
    Directory,
}

impl EntryType {
    pub(crate) fn to_db(self) -> i64 {
        match self {
            Self::File => 0,
            Self::Directory => 1,
        }
    }

    pub(crate) fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::File),
            1 => Some(Self::Directory),
            _ => None,
        }
    }
}

/// A stored `fs` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEntry {
    pub id: i64,
    pub parent_id: i64,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub mime_type: Option<String>,
    #[serde(with = "bits")]
    pub content_types: ContentTypes,
}

/// A filesystem entry together with its metadata.
///
/// Records built by processors have no `id`/`parent_id` until they are
/// saved; records read from the database always do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<i64>,
    pub parent_id: Option<i64>,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub mime_type: Option<String>,
    #[serde(with = "bits")]
    pub content_types: ContentTypes,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    /// An unsaved generic file record.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: None,
            parent_id: None,
            path: path.into(),
            entry_type: EntryType::File,
            mime_type: None,
            content_types: ContentTypes::GENERIC,
            metadata: Metadata::new(),
        }
    }

    /// An unsaved directory record.
    pub fn directory(path: impl Into<String>, content_types: ContentTypes) -> Self {
        Self { entry_type: EntryType::Directory, content_types: content_types | ContentTypes::GENERIC, ..Self::new(path) }
    }

    pub(crate) fn from_entry(entry: FsEntry, metadata: Metadata) -> Self {
        Self {
            id: Some(entry.id),
            parent_id: Some(entry.parent_id),
            path: entry.path,
            entry_type: entry.entry_type,
            mime_type: entry.mime_type,
            content_types: entry.content_types,
            metadata,
        }
    }
}

impl From<FsEntry> for Record {
    fn from(entry: FsEntry) -> Self {
        Self::from_entry(entry, Metadata::new())
    }
}

/// Content types are stored and cached as their raw bits.
mod bits {
    use crate::contenttypes::ContentTypes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(types: &ContentTypes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(types.bits())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ContentTypes, D::Error> {
        u32::deserialize(deserializer).map(ContentTypes::from_bits_retain)
    }
}
