//! Writes one `fs` row together with every ancestor it needs.
//!
//! Ancestors are resolved from the cache first, root down, until the first
//! miss; a missing parent cannot have valid cached children, so the rest of
//! the chain comes from a single select. Whatever is still missing after that
//! is created top-down.

use crate::contenttypes::ContentTypes;
use crate::error::{ErrorKind, Result};
use crate::exts::Cache;
use crate::models::FsRow;
use crate::record::{EntryType, FsEntry, Record};
use crate::store::Store;
use exn::ResultExt;
use librarian_fsal::path;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::time::Duration;

/// Cache key prefix owned by the writer.
pub(crate) const CACHE_PREFIX: &str = "fs_";

pub(crate) fn cache_key(path: &str) -> String {
    format!("{CACHE_PREFIX}{path}")
}

pub(crate) struct FsWriter<'a> {
    store: &'a Store,
    cache: &'a dyn Cache,
    ttl: Duration,
}

impl<'a> FsWriter<'a> {
    pub(crate) fn new(store: &'a Store, cache: &'a dyn Cache, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Store `record`'s entry and return the row as written.
    ///
    /// Files OR their content types into their own row and into their
    /// parent's; directories overwrite their own mask.
    pub(crate) async fn write(&self, record: &Record) -> Result<FsEntry> {
        let target = path::normalize(&record.path).or_raise(|| ErrorKind::InvalidPath(record.path.clone()))?;
        let parent = path::dirname(&target).to_string();
        let types = record.content_types | ContentTypes::GENERIC;
        let is_file = record.entry_type == EntryType::File;
        let chain = path::ancestors(&target);
        let mut existing = self.resolve(&chain).await?;

        let mut last: Option<FsEntry> = None;
        let mut written = None;
        for ancestor in &chain {
            let is_target = *ancestor == target;
            let entry = match existing.remove(ancestor) {
                Some(entry) if is_target => Some(self.update(entry, record, types).await?),
                Some(entry) if is_file && *ancestor == parent => Some(self.merge(entry, types).await?),
                Some(entry) => Some(entry),
                None => None,
            };
            let entry = match entry {
                Some(entry) => entry,
                None => {
                    let parent_id = last.as_ref().map_or(0, |entry| entry.id);
                    let mut mask = ContentTypes::GENERIC;
                    if is_target || (is_file && *ancestor == parent) {
                        mask |= types;
                    }
                    let (entry_type, mime_type) = match is_target {
                        true => (record.entry_type, record.mime_type.as_deref()),
                        false => (EntryType::Directory, None),
                    };
                    self.insert(parent_id, ancestor, entry_type, mime_type, mask).await?
                },
            };
            if is_target {
                written = Some(entry.clone());
            }
            last = Some(entry);
        }
        written.or(last).ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(target)))
    }

    /// Existing rows for `chain`, keyed by path.
    async fn resolve(&self, chain: &[String]) -> Result<HashMap<String, FsEntry>> {
        let mut found = HashMap::new();
        for ancestor in chain {
            match self.cached(ancestor).await {
                Some(entry) => {
                    found.insert(ancestor.clone(), entry);
                },
                None => break,
            }
        }
        let tail = &chain[found.len()..];
        if tail.is_empty() {
            return Ok(found);
        }

        let rows: Vec<FsRow> = {
            let mut query = QueryBuilder::<Sqlite>::new(include_str!("../queries/select_fs_chain.sql"));
            let mut separated = query.separated(", ");
            for ancestor in tail {
                separated.push_bind(ancestor.as_str());
            }
            query.push(") ORDER BY length(path)");
            let mut conn = self.store.acquire().await?;
            query.build_query_as::<FsRow>().fetch_all(&mut *conn).await.or_raise(|| ErrorKind::Database)?
        };
        for row in rows {
            let entry = FsEntry::try_from(row)?;
            self.remember(&entry).await;
            found.insert(entry.path.clone(), entry);
        }
        Ok(found)
    }

    async fn insert(
        &self,
        parent_id: i64,
        path: &str,
        entry_type: EntryType,
        mime_type: Option<&str>,
        content_types: ContentTypes,
    ) -> Result<FsEntry> {
        let row: FsRow = {
            let mut conn = self.store.acquire().await?;
            sqlx::query_as(include_str!("../queries/insert_fs.sql"))
                .bind(parent_id)
                .bind(path)
                .bind(entry_type.to_db())
                .bind(mime_type)
                .bind(content_types.to_db())
                .fetch_one(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?
        };
        let entry = FsEntry::try_from(row)?;
        self.remember(&entry).await;
        Ok(entry)
    }

    /// Refresh the target's existing row.
    async fn update(&self, entry: FsEntry, record: &Record, types: ContentTypes) -> Result<FsEntry> {
        if record.entry_type == EntryType::File {
            return self.merge(entry, types).await;
        }
        let row: FsRow = {
            let mut conn = self.store.acquire().await?;
            sqlx::query_as(include_str!("../queries/overwrite_fs.sql"))
                .bind(record.entry_type.to_db())
                .bind(record.mime_type.as_deref())
                .bind(types.to_db())
                .bind(entry.path.as_str())
                .fetch_one(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?
        };
        let entry = FsEntry::try_from(row)?;
        self.remember(&entry).await;
        Ok(entry)
    }

    /// OR `types` into an existing row's mask.
    async fn merge(&self, entry: FsEntry, types: ContentTypes) -> Result<FsEntry> {
        if entry.content_types.contains(types) {
            return Ok(entry);
        }
        let row: FsRow = {
            let mut conn = self.store.acquire().await?;
            sqlx::query_as(include_str!("../queries/merge_content_types.sql"))
                .bind(types.to_db())
                .bind(entry.path.as_str())
                .fetch_one(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?
        };
        let entry = FsEntry::try_from(row)?;
        self.remember(&entry).await;
        Ok(entry)
    }

    async fn cached(&self, path: &str) -> Option<FsEntry> {
        let raw = match self.cache.get(&cache_key(path)).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(path, error = ?err, "cache lookup failed");
                return None;
            },
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(path, error = %err, "discarding unreadable cache entry");
                None
            },
        }
    }

    async fn remember(&self, entry: &FsEntry) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(path = %entry.path, error = %err, "could not encode cache entry");
                return;
            },
        };
        if let Err(err) = self.cache.set(&cache_key(&entry.path), raw, self.ttl).await {
            tracing::warn!(path = %entry.path, error = ?err, "cache store failed");
        }
    }
}
