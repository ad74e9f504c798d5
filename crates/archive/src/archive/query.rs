use super::{Analysis, Archive, ScanOptions, callback};
use crate::batch::{IntoPaths, QUERY_BATCH, batched};
use crate::contenttypes::{self, ContentType, ContentTypes};
use crate::error::{ErrorKind, Result};
use crate::models::{MetaJoinRow, group_rows};
use crate::record::Record;
use crate::wrapper::MetaWrapper;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use librarian_fsal::path;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    /// Only paths this content type's processor accepts, and only records
    /// carrying its bit.
    pub content_type: Option<ContentType>,
    /// For paths not in the database yet: answer with a quick partial
    /// analysis and finish the job in the background, rather than
    /// analyzing and storing them before returning.
    pub partial: bool,
    /// Leave paths not in the database out of the result.
    pub ignore_missing: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self { content_type: None, partial: true, ignore_missing: false }
    }
}

impl GetOptions {
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn ignore_missing(mut self, ignore_missing: bool) -> Self {
        self.ignore_missing = ignore_missing;
        self
    }
}

/// How [`Archive::parent`] finds a directory's children.
#[derive(Debug, Clone, Default)]
pub enum Refresh {
    /// Use the stored record if there is one.
    #[default]
    Never,
    /// List and partially analyze the directory again.
    Rescan,
    /// Use these children, already collected by the caller.
    Using(Analysis),
}

fn mask_of(content_type: Option<ContentType>) -> ContentTypes {
    content_type.map_or(ContentTypes::empty(), ContentTypes::from)
}

/// `value` as a `LIKE` pattern matching it anywhere, with `\` as the escape.
fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl Archive {
    /// Stored records for `paths`.
    ///
    /// Paths missing from the database are analyzed unless
    /// `options.ignore_missing` is set; see [`GetOptions::partial`].
    #[instrument(skip(self, paths))]
    pub async fn get(&self, paths: impl IntoPaths, options: GetOptions) -> Result<Analysis> {
        let mut wanted = Vec::new();
        for raw in paths.into_paths() {
            wanted.push(path::normalize(&raw).or_raise(|| ErrorKind::InvalidPath(raw.clone()))?);
        }
        if let Some(content_type) = options.content_type {
            let processor = self.inner.processors.for_type(content_type)?;
            wanted.retain(|path| processor.can_process(path));
        }
        wanted.sort();
        wanted.dedup();
        if wanted.is_empty() {
            return Ok(Analysis::new());
        }

        let mask = mask_of(options.content_type);
        let mut found: Analysis = batched(&wanted, QUERY_BATCH, |batch| self.select_records(batch, mask)).await?;
        let missing: Vec<String> = wanted.into_iter().filter(|path| !found.contains_key(path)).collect();
        if missing.is_empty() || options.ignore_missing {
            return Ok(found);
        }

        if options.partial {
            let archive = self.clone();
            let persist = callback(move |analysis| {
                let archive = archive.clone();
                async move {
                    if let Err(err) = archive.save_many(analysis).await {
                        tracing::error!(error = ?err, "storing background analysis failed");
                    }
                }
            });
            self.analyze_in_background(missing.clone(), false, persist)?;
            found.extend(self.analyze(missing, true).await?);
        } else {
            let analysis = self.analyze(missing, false).await?;
            self.save_many(analysis.clone()).await?;
            found.extend(analysis);
        }
        Ok(found)
    }

    async fn select_records(&self, paths: &[String], mask: ContentTypes) -> Result<Analysis> {
        let mut query = QueryBuilder::<Sqlite>::new(include_str!("../../queries/select_records.sql"));
        let mut separated = query.separated(", ");
        for path in paths {
            separated.push_bind(path.as_str());
        }
        query.push(") AND (fs.content_types & ");
        query.push_bind(mask.to_db());
        query.push(") = ");
        query.push_bind(mask.to_db());
        query.push(" ORDER BY fs.path, meta.language, meta.key");
        let rows: Vec<MetaJoinRow> = {
            let mut conn = self.inner.store.acquire().await?;
            query.build_query_as::<MetaJoinRow>().fetch_all(&mut *conn).await.or_raise(|| ErrorKind::Database)?
        };
        Ok(wrap(group_rows(rows)?))
    }

    /// Direct children of the directory at `path`, optionally only those
    /// carrying `content_type`'s bit.
    #[instrument(skip(self))]
    pub async fn for_parent(&self, path: &str, content_type: Option<ContentType>) -> Result<Analysis> {
        let path = path::normalize(path).or_raise(|| ErrorKind::InvalidPath(path.to_string()))?;
        let mask = mask_of(content_type).to_db();
        let rows: Vec<MetaJoinRow> = {
            let mut conn = self.inner.store.acquire().await?;
            sqlx::query_as(include_str!("../../queries/select_children.sql"))
                .bind(path.as_str())
                .bind(mask)
                .bind(mask)
                .fetch_all(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?
        };
        Ok(wrap(group_rows(rows)?))
    }

    /// The directory record for `path`, with a mask that is the OR of its
    /// files' masks.
    ///
    /// With [`Refresh::Never`] a stored record is returned as is. Otherwise
    /// the mask is recomputed from the children and stored; metadata already
    /// on the directory is kept.
    #[instrument(skip(self, refresh))]
    pub async fn parent(&self, path: &str, refresh: Refresh) -> Result<MetaWrapper> {
        let path = path::normalize(path).or_raise(|| ErrorKind::InvalidPath(path.to_string()))?;
        let children = match refresh {
            Refresh::Never => {
                let mut stored = self.get(path.as_str(), GetOptions::default().ignore_missing(true)).await?;
                if let Some(found) = stored.remove(&path) {
                    return Ok(found);
                }
                self.rescan_level(&path).await
            },
            Refresh::Rescan => self.rescan_level(&path).await,
            Refresh::Using(children) => children,
        };
        let types = children.values().fold(ContentTypes::GENERIC, |mask, child| mask | child.content_types());
        self.save_record(Record::directory(path.as_str(), types)).await?;
        let mut stored = self.get(path.as_str(), GetOptions::default().ignore_missing(true)).await?;
        stored.remove(&path).ok_or_raise(|| ErrorKind::InvalidData(format!("directory {path:?} was not stored")))
    }

    /// A partial analysis of the files directly under `path`. Empty when the
    /// directory cannot be listed.
    async fn rescan_level(&self, path: &str) -> Analysis {
        let options = ScanOptions::new(path).partial(true).maxdepth(0);
        self.scan(options).next().await.unwrap_or_default()
    }

    /// Records with a search key whose value contains `terms`, ignoring
    /// ASCII case.
    ///
    /// Matching uses SQLite's `LIKE`, which folds `A-Z` only: `"ÉTÉ"` does
    /// not find `"été"`.
    ///
    /// `language` of `None` matches every language; `Some("")` only values
    /// stored without one. Each record carries only the matching values.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        terms: &str,
        content_type: Option<ContentType>,
        language: Option<&str>,
    ) -> Result<Analysis> {
        let keys = contenttypes::search_keys(content_type);
        if keys.is_empty() {
            return Ok(Analysis::new());
        }
        let pattern = contains_pattern(terms);
        let mask = mask_of(content_type).to_db();

        let mut query = QueryBuilder::<Sqlite>::new(include_str!("../../queries/search_records.sql"));
        for (index, key) in keys.into_iter().enumerate() {
            if index > 0 {
                query.push(" OR ");
            }
            query.push("(meta.key = ");
            query.push_bind(key);
            query.push(" AND meta.value LIKE ");
            query.push_bind(pattern.clone());
            query.push(" ESCAPE '\\')");
        }
        query.push(")");
        if let Some(language) = language {
            query.push(" AND meta.language = ");
            query.push_bind(language);
        }
        query.push(" AND (fs.content_types & ");
        query.push_bind(mask);
        query.push(") = ");
        query.push_bind(mask);
        query.push(" ORDER BY fs.path, meta.language, meta.key");

        let rows: Vec<MetaJoinRow> = {
            let mut conn = self.inner.store.acquire().await?;
            query.build_query_as::<MetaJoinRow>().fetch_all(&mut *conn).await.or_raise(|| ErrorKind::Database)?
        };
        Ok(wrap(group_rows(rows)?))
    }
}

fn wrap(records: BTreeMap<String, Record>) -> Analysis {
    records.into_iter().map(|(path, record)| (path, MetaWrapper::new(record))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::archive;
    use crate::record::EntryType;
    use librarian_fsal::MockFsal;
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn image(path: &str, title: &str) -> Record {
        let mut record = Record::new(path);
        record.content_types |= ContentTypes::IMAGE;
        record.mime_type = Some("image/jpeg".to_string());
        record.metadata.entry(String::new()).or_default().insert("title".to_string(), title.to_string());
        record.metadata.entry(String::new()).or_default().insert("width".to_string(), "640".to_string());
        record
    }

    #[rstest]
    #[case("cat", "%cat%")]
    #[case("100%", "%100\\%%")]
    #[case("a_b", "%a\\_b%")]
    #[case("c:\\x", "%c:\\\\x%")]
    fn test_contains_pattern(#[case] terms: &str, #[case] expected: &str) {
        assert_eq!(contains_pattern(terms), expected);
    }

    #[tokio::test]
    async fn test_get_round_trip() {
        let (archive, queue) = archive(MockFsal::default()).await;
        let saved = archive.save(image("/m/a.jpg", "Fluffy")).await.unwrap();
        let found = archive.get("/m/a.jpg", GetOptions::default()).await.unwrap();
        assert_eq!(found["/m/a.jpg"], saved);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_get_filters_by_content_type() {
        let (archive, _) = archive(MockFsal::default()).await;
        archive.save(image("/m/a.jpg", "Fluffy")).await.unwrap();
        let none = archive
            .get(["/m/a.jpg", "/m/b.mp3"], GetOptions::default().content_type(ContentType::Html).ignore_missing(true))
            .await
            .unwrap();
        assert!(none.is_empty());
        let images = archive
            .get(["/m/a.jpg", "/m/b.mp3"], GetOptions::default().content_type(ContentType::Image).ignore_missing(true))
            .await
            .unwrap();
        assert_eq!(images.keys().collect::<Vec<_>>(), vec!["/m/a.jpg"]);
    }

    #[tokio::test]
    async fn test_get_blocking_stores_missing() {
        let fsal = MockFsal::with_files([("/m/a.jpg", "jpg")]);
        let (archive, queue) = archive(fsal).await;
        let found = archive.get("/m/a.jpg", GetOptions::default().partial(false)).await.unwrap();
        assert!(found["/m/a.jpg"].content_types().contains(ContentTypes::IMAGE));
        assert!(queue.is_empty());
        let stored = archive.get("/m/a.jpg", GetOptions::default().ignore_missing(true)).await.unwrap();
        assert!(stored["/m/a.jpg"].id().is_some());
    }

    #[tokio::test]
    async fn test_get_many_batches() {
        let (archive, _) = archive(MockFsal::default()).await;
        let paths: Vec<String> = (0..1500).map(|i| format!("/bulk/{i:04}.jpg")).collect();
        // Both sides of the first chunk boundary, plus a spread over the rest.
        let stored: BTreeSet<usize> = (0..1500).step_by(100).chain(QUERY_BATCH - 3..QUERY_BATCH + 3).collect();
        for &i in &stored {
            archive.save(image(&paths[i], &format!("n{i}"))).await.unwrap();
        }
        let found = archive.get(&paths, GetOptions::default().ignore_missing(true)).await.unwrap();
        let expected: Vec<&String> = stored.iter().map(|&i| &paths[i]).collect();
        assert_eq!(found.keys().collect::<Vec<_>>(), expected);
        for &i in &stored {
            assert_eq!(found[&paths[i]].metadata()[""]["title"], format!("n{i}"));
        }
    }

    #[tokio::test]
    async fn test_get_missing_across_batches() {
        let (archive, _) = archive(MockFsal::default()).await;
        let paths: Vec<String> = (0..QUERY_BATCH + 1).map(|i| format!("/bulk/{i:04}.jpg")).collect();
        archive.save(image(&paths[QUERY_BATCH], "last")).await.unwrap();
        let found = archive.get(&paths, GetOptions::default().ignore_missing(true)).await.unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec![&paths[QUERY_BATCH]]);
    }

    #[tokio::test]
    async fn test_for_parent() {
        let (archive, _) = archive(MockFsal::default()).await;
        archive.save(image("/m/a.jpg", "Fluffy")).await.unwrap();
        let mut song = Record::new("/m/b.mp3");
        song.content_types |= ContentTypes::AUDIO;
        archive.save(song).await.unwrap();
        archive.save(image("/m/sub/c.jpg", "Deep")).await.unwrap();

        let children = archive.for_parent("/m", None).await.unwrap();
        assert_eq!(children.keys().collect::<Vec<_>>(), vec!["/m/a.jpg", "/m/b.mp3", "/m/sub"]);
        assert_eq!(children["/m/a.jpg"].metadata()[""]["title"], "Fluffy");
        assert_eq!(children["/m/sub"].entry_type(), EntryType::Directory);

        let images = archive.for_parent("/m", Some(ContentType::Image)).await.unwrap();
        assert_eq!(images.keys().collect::<Vec<_>>(), vec!["/m/a.jpg", "/m/sub"]);
    }

    #[tokio::test]
    async fn test_parent_from_supplied_children() {
        let (archive, _) = archive(MockFsal::default()).await;
        let mut children = Analysis::new();
        children.insert("/d/x.mp3".to_string(), MetaWrapper::new(Record {
            content_types: ContentTypes::GENERIC | ContentTypes::AUDIO,
            ..Record::new("/d/x.mp3")
        }));
        let parent = archive.parent("/d", Refresh::Using(children)).await.unwrap();
        assert_eq!(parent.content_types(), ContentTypes::GENERIC | ContentTypes::AUDIO);
        assert_eq!(parent.entry_type(), EntryType::Directory);
    }

    #[tokio::test]
    async fn test_parent_rescans_when_missing() {
        let fsal = MockFsal::with_files([("/d/a.jpg", "jpg"), ("/d/b.txt", "txt"), ("/d/sub/c.mp3", "mp3")]);
        let (archive, _) = archive(fsal).await;
        let parent = archive.parent("/d", Refresh::Never).await.unwrap();
        assert_eq!(parent.content_types(), ContentTypes::GENERIC | ContentTypes::IMAGE);
    }

    #[tokio::test]
    async fn test_parent_keeps_directory_metadata() {
        let fsal = MockFsal::with_files([("/d/a.jpg", "jpg")]);
        let (archive, _) = archive(fsal).await;
        let mut directory = Record::directory("/d", ContentTypes::empty());
        directory.metadata.entry(String::new()).or_default().insert("name".to_string(), "Pictures".to_string());
        archive.save(directory).await.unwrap();
        let parent = archive.parent("/d", Refresh::Rescan).await.unwrap();
        assert_eq!(parent.content_types(), ContentTypes::GENERIC | ContentTypes::IMAGE);
        assert_eq!(parent.metadata()[""]["name"], "Pictures");
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let (archive, _) = archive(MockFsal::default()).await;
        archive.save(image("/m/a.jpg", "100% cat")).await.unwrap();
        archive.save(image("/m/b.jpg", "1000 cats")).await.unwrap();
        let found = archive.search("100%", None, None).await.unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["/m/a.jpg"]);
        let found = archive.search("CAT", Some(ContentType::Image), Some("")).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(archive.search("cat", Some(ContentType::Audio), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_folds_ascii_case_only() {
        let (archive, _) = archive(MockFsal::default()).await;
        archive.save(image("/m/summer.jpg", "Un été à Paris")).await.unwrap();
        let found = archive.search("PARIS", None, None).await.unwrap();
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["/m/summer.jpg"]);
        assert_eq!(archive.search("été", None, None).await.unwrap().len(), 1);
        assert!(archive.search("ÉTÉ", None, None).await.unwrap().is_empty());
    }
}
