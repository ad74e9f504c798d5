use crate::contenttypes::{self, ContentTypes};
use crate::record::{EntryType, Metadata, Record};
use librarian_extract::{NO_LANGUAGE, Value};
use librarian_fsal::path;
use serde::Serialize;

/// Read-only, typed view of a [`Record`].
///
/// Lookups fall back from the requested language to the no-language bucket,
/// and values come back coerced according to the content type registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetaWrapper {
    record: Record,
}

impl MetaWrapper {
    pub fn new(record: Record) -> Self {
        Self { record }
    }

    /// `metadata[language][key]`, else `metadata[""][key]`.
    ///
    /// Values that do not parse as their registered type are returned as
    /// text rather than dropped.
    pub fn get(&self, key: &str, language: &str) -> Option<Value> {
        let raw = self
            .lookup(language, key)
            .or_else(|| self.lookup(NO_LANGUAGE, key))?;
        Some(contenttypes::coercion(key).coerce(raw).unwrap_or_else(|| Value::from(raw)))
    }

    pub fn get_or(&self, key: &str, language: &str, default: Value) -> Value {
        self.get(key, language).unwrap_or(default)
    }

    fn lookup(&self, language: &str, key: &str) -> Option<&str> {
        self.record.metadata.get(language)?.get(key).map(String::as_str)
    }

    pub fn id(&self) -> Option<i64> {
        self.record.id
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.record.parent_id
    }

    pub fn path(&self) -> &str {
        &self.record.path
    }

    /// Final path component.
    pub fn name(&self) -> &str {
        path::basename(&self.record.path)
    }

    pub fn entry_type(&self) -> EntryType {
        self.record.entry_type
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.record.mime_type.as_deref()
    }

    pub fn content_types(&self) -> ContentTypes {
        self.record.content_types
    }

    pub fn content_type_names(&self) -> Vec<&'static str> {
        contenttypes::from_bitmask(self.record.content_types)
    }

    /// Whether any of this entry's content types admits `key`.
    pub fn has_key(&self, key: &str) -> bool {
        contenttypes::keys_for(self.record.content_types).contains(key)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.record.metadata
    }

    pub fn as_record(&self) -> &Record {
        &self.record
    }

    /// The wrapped record, unchanged.
    pub fn into_inner(self) -> Record {
        self.record
    }
}

impl From<Record> for MetaWrapper {
    fn from(record: Record) -> Self {
        Self::new(record)
    }
}

impl From<MetaWrapper> for Record {
    fn from(wrapper: MetaWrapper) -> Self {
        wrapper.into_inner()
    }
}
