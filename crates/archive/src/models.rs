//! Database row types.

use crate::contenttypes::ContentTypes;
use crate::error::{Error, ErrorKind, Result};
use crate::record::{EntryType, FsEntry, Record};
use exn::OptionExt;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FsRow {
    id: i64,
    parent_id: i64,
    path: String,
    #[sqlx(rename = "type")]
    entry_type: i64,
    mime_type: Option<String>,
    content_types: i64,
}
impl TryFrom<FsRow> for FsEntry {
    type Error = Error;
    fn try_from(row: FsRow) -> Result<Self> {
        let entry_type = EntryType::from_db(row.entry_type)
            .ok_or_raise(|| ErrorKind::InvalidData(format!("entry type {} of {}", row.entry_type, row.path)))?;
        Ok(Self {
            id: row.id,
            parent_id: row.parent_id,
            entry_type,
            mime_type: row.mime_type,
            content_types: ContentTypes::from_db(row.content_types)?,
            path: row.path,
        })
    }
}

/// One `fs` row joined with at most one of its `meta` rows.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MetaJoinRow {
    #[sqlx(flatten)]
    fs: FsRow,
    language: Option<String>,
    key: Option<String>,
    value: Option<String>,
}

/// Fold joined rows into one record per path.
///
/// Rows without meta columns (entries with no metadata at all under a LEFT
/// JOIN) still produce a record.
pub(crate) fn group_rows(rows: Vec<MetaJoinRow>) -> Result<BTreeMap<String, Record>> {
    let mut records = BTreeMap::new();
    for MetaJoinRow { fs, language, key, value } in rows {
        let record = match records.entry(fs.path.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Record::from(FsEntry::try_from(fs)?)),
        };
        if let (Some(language), Some(key)) = (language, key) {
            record.metadata.entry(language).or_default().insert(key, value.unwrap_or_default());
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs_row(id: i64, path: &str) -> FsRow {
        FsRow {
            id,
            parent_id: 1,
            path: path.to_string(),
            entry_type: 0,
            mime_type: Some("image/jpeg".to_string()),
            content_types: 17,
        }
    }

    fn join_row(id: i64, path: &str, meta: Option<(&str, &str, &str)>) -> MetaJoinRow {
        MetaJoinRow {
            fs: fs_row(id, path),
            language: meta.map(|m| m.0.to_string()),
            key: meta.map(|m| m.1.to_string()),
            value: meta.map(|m| m.2.to_string()),
        }
    }

    #[test]
    fn test_row_to_model() {
        let entry = FsEntry::try_from(fs_row(7, "/a.jpg")).unwrap();
        assert_eq!(entry.entry_type, EntryType::File);
        assert_eq!(entry.content_types, ContentTypes::GENERIC | ContentTypes::IMAGE);
    }

    #[test]
    fn test_invalid_entry_type() {
        let mut row = fs_row(7, "/a.jpg");
        row.entry_type = 4;
        let err = FsEntry::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }

    #[test]
    fn test_group_rows() {
        let rows = vec![
            join_row(2, "/a.jpg", Some(("", "height", "480"))),
            join_row(2, "/a.jpg", Some(("", "width", "640"))),
            join_row(2, "/a.jpg", Some(("en", "title", "Fluffy"))),
            join_row(3, "/b.jpg", None),
        ];
        let records = group_rows(rows).unwrap();
        assert_eq!(records.len(), 2);
        let a = &records["/a.jpg"];
        assert_eq!(a.id, Some(2));
        assert_eq!(a.metadata[""].len(), 2);
        assert_eq!(a.metadata["en"]["title"], "Fluffy");
        assert!(records["/b.jpg"].metadata.is_empty());
    }
}
