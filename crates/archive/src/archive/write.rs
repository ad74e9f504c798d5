use super::{Analysis, Archive, Refresh, ScanOptions};
use crate::batch::{IntoPaths, QUERY_BATCH, batched};
use crate::contenttypes::{self, ContentType};
use crate::error::{ErrorKind, Result};
use crate::exts::Event;
use crate::fswriter::{CACHE_PREFIX, FsWriter, cache_key};
use crate::record::{AUTO_LANGUAGE, EntryType, Metadata, Record};
use crate::wrapper::MetaWrapper;
use exn::ResultExt;
use futures::StreamExt;
use librarian_fsal::{ChangeKind, path};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

impl Archive {
    /// Store a record, or a wrapper's record, and return it as stored.
    ///
    /// Metadata keys that none of the entry's content types admit are
    /// dropped. Each language present replaces what was stored for that
    /// language; languages not present are left alone.
    pub async fn save(&self, data: impl Into<Record>) -> Result<MetaWrapper> {
        let record = data.into();
        if record.metadata.contains_key(AUTO_LANGUAGE) {
            exn::bail!(ErrorKind::ReservedLanguage(AUTO_LANGUAGE.to_string()));
        }
        self.save_record(record).await
    }

    /// [`save`](Self::save) each record in turn.
    pub async fn save_many(&self, records: Analysis) -> Result<()> {
        for wrapper in records.into_values() {
            self.save(wrapper).await?;
        }
        Ok(())
    }

    pub(super) async fn save_record(&self, record: Record) -> Result<MetaWrapper> {
        let writer = FsWriter::new(&self.inner.store, self.inner.cache.as_ref(), self.inner.config.cache_ttl());
        let entry = writer.write(&record).await?;

        let mut admitted = contenttypes::keys_for(entry.content_types);
        if entry.entry_type == EntryType::Directory {
            admitted.extend(contenttypes::keys(Some(ContentType::Directory)).into_keys());
        }
        let metadata: Metadata = record
            .metadata
            .into_iter()
            .map(|(language, section)| {
                let section: BTreeMap<_, _> =
                    section.into_iter().filter(|(key, _)| admitted.contains(key.as_str())).collect();
                (language, section)
            })
            .filter(|(_, section)| !section.is_empty())
            .collect();

        let mut conn = self.inner.store.acquire().await?;
        for (language, section) in &metadata {
            sqlx::query(include_str!("../../queries/delete_meta_language.sql"))
                .bind(entry.id)
                .bind(language)
                .execute(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
            for (key, value) in section {
                sqlx::query(include_str!("../../queries/upsert_meta.sql"))
                    .bind(entry.id)
                    .bind(language)
                    .bind(key)
                    .bind(value)
                    .execute(&mut *conn)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
            }
        }
        drop(conn);
        tracing::debug!(path = %entry.path, languages = metadata.len(), "metadata stored");
        Ok(MetaWrapper::new(Record::from_entry(entry, metadata)))
    }

    /// Delete `paths`, everything beneath them and their outgoing links,
    /// then recompute the mask of each parent directory that survives.
    #[instrument(skip(self, paths))]
    pub async fn remove(&self, paths: impl IntoPaths) -> Result<()> {
        let mut targets = Vec::new();
        for raw in paths.into_paths() {
            targets.push(path::normalize(&raw).or_raise(|| ErrorKind::InvalidPath(raw.clone()))?);
        }
        targets.sort();
        targets.dedup();
        if targets.is_empty() {
            return Ok(());
        }

        self.inner.store.begin().await?;
        let outcome = batched(&targets, QUERY_BATCH, |batch| self.remove_batch(batch)).await;
        let removed: BTreeSet<String> = self.settle(outcome).await?;
        tracing::debug!(count = removed.len(), "removed");

        let parents: BTreeSet<&str> = targets
            .iter()
            .filter(|target| !target.is_empty())
            .map(|target| path::dirname(target))
            .filter(|parent| !removed.contains(*parent))
            .collect();
        for parent in parents {
            self.parent(parent, Refresh::Rescan).await?;
        }
        Ok(())
    }

    async fn remove_batch(&self, paths: &[String]) -> Result<Vec<String>> {
        let mut doomed = BTreeSet::new();
        for path in paths {
            doomed.extend(self.descendants(path).await?);
            doomed.insert(path.clone());
        }
        for path in &doomed {
            for processor in self.inner.processors.for_path(path)? {
                processor.deprocess(&self.inner.links, path).await?;
            }
            if let Err(err) = self.inner.cache.delete(&cache_key(path)).await {
                tracing::warn!(%path, error = ?err, "cache invalidation failed");
            }
        }
        let doomed: Vec<String> = doomed.into_iter().collect();
        for chunk in doomed.chunks(QUERY_BATCH) {
            self.delete_paths(include_str!("../../queries/delete_meta_for_paths.sql"), chunk, "))").await?;
            self.delete_paths(include_str!("../../queries/delete_fs_for_paths.sql"), chunk, ")").await?;
        }
        Ok(doomed)
    }

    /// Stored paths strictly beneath `path`.
    async fn descendants(&self, path: &str) -> Result<Vec<String>> {
        let mut conn = self.inner.store.acquire().await?;
        let query = if path.is_empty() {
            sqlx::query_scalar::<Sqlite, String>(include_str!("../../queries/select_all_paths.sql"))
        } else {
            // Every path below `dir` sorts between "dir/" and "dir0".
            sqlx::query_scalar::<Sqlite, String>(include_str!("../../queries/select_descendants.sql"))
                .bind(format!("{path}/"))
                .bind(format!("{path}0"))
        };
        query.fetch_all(&mut *conn).await.or_raise(|| ErrorKind::Database)
    }

    async fn delete_paths(&self, prefix: &str, paths: &[String], suffix: &str) -> Result<()> {
        let mut query = QueryBuilder::<Sqlite>::new(prefix);
        let mut separated = query.separated(", ");
        for path in paths {
            separated.push_bind(path.as_str());
        }
        query.push(suffix);
        let mut conn = self.inner.store.acquire().await?;
        query.build().execute(&mut *conn).await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Empty the archive.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.inner.store.begin().await?;
        let outcome = self.clear_tables().await;
        self.settle(outcome).await?;
        self.purge_cache().await;
        Ok(())
    }

    /// Empty the archive and rebuild it from a full scan of the library, as
    /// one transaction. On failure the archive is left as it was.
    #[instrument(skip(self))]
    pub async fn clear_and_reload(&self) -> Result<()> {
        self.inner.store.begin().await?;
        let outcome = self.reload().await;
        self.settle(outcome).await
    }

    async fn reload(&self) -> Result<()> {
        self.clear_tables().await?;
        self.purge_cache().await;
        let mut levels = self.scan(ScanOptions::default());
        while let Some(analysis) = levels.next().await {
            self.save_many(analysis).await?;
        }
        Ok(())
    }

    async fn clear_tables(&self) -> Result<()> {
        let mut conn = self.inner.store.acquire().await?;
        sqlx::query(include_str!("../../queries/clear.sql"))
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn purge_cache(&self) {
        if let Err(err) = self.inner.cache.delete_prefix(CACHE_PREFIX).await {
            tracing::warn!(error = ?err, "cache purge failed");
        }
    }

    /// Commit the open transaction if `outcome` succeeded, roll it back
    /// otherwise.
    ///
    /// A rollback also empties the entry cache: anything cached while the
    /// transaction was open may describe rows that no longer exist.
    async fn settle<T>(&self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.inner.store.commit().await?;
                Ok(value)
            },
            Err(err) => {
                if let Err(rollback) = self.inner.store.rollback().await {
                    tracing::error!(error = ?rollback, "rollback failed");
                }
                self.purge_cache().await;
                Err(err)
            },
        }
    }

    /// Apply the changes the FSAL has seen since the last call, then
    /// republish each one as [`FS_EVENT`](crate::exts::FS_EVENT). Returns
    /// whether there were any.
    ///
    /// Deleted paths are removed, new or modified files are analyzed and
    /// stored, new or modified directories get their mask recomputed.
    #[instrument(skip(self))]
    pub async fn refresh_changes(&self) -> Result<bool> {
        let fsal = &self.inner.fsal;
        let changes = fsal.get_changes().await.or_raise(|| ErrorKind::Filesystem(fsal.name().to_string()))?;
        if changes.is_empty() {
            return Ok(false);
        }
        for change in changes {
            match change.kind {
                ChangeKind::Deleted => self.remove(change.path.as_str()).await?,
                _ if change.is_dir => {
                    self.parent(&change.path, Refresh::Rescan).await?;
                },
                _ => {
                    let analysis = self.analyze(change.path.as_str(), false).await?;
                    self.save_many(analysis).await?;
                },
            }
            self.inner.events.publish(Event::FsEvent(change)).await;
        }
        Ok(true)
    }
}
