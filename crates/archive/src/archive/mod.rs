//! The archive: one façade over the database, the processors and the
//! collaborators they need.
//!
//! Every operation comes in a blocking form that returns its result. Where
//! work can also be pushed to the background (`analyze`, `scan`) there is a
//! second method taking a [`Callback`], which schedules the work and returns
//! as soon as the scheduler has accepted it.

mod analyze;
mod query;
mod scan;
mod write;

pub use self::query::{GetOptions, Refresh};
pub use self::scan::ScanOptions;
use crate::Database;
use crate::contenttypes::{ContentType, ContentTypes};
use crate::error::{ErrorKind, Result};
use crate::exts::{
    CacheHandle, ENTRY_POINT_FOUND, Event, EventBusHandle, LocalEventBus, MemoryCache, SchedulerHandle, Subscriber,
    TokioScheduler,
};
use crate::links::LinkIndex;
use crate::processor::Processors;
use crate::record::{AUTO_LANGUAGE, EntryType, Record};
use crate::store::Store;
use crate::wrapper::MetaWrapper;
use async_trait::async_trait;
use exn::ResultExt;
use futures::future::BoxFuture;
use librarian_config::{ArchiveConfig, Config};
use librarian_fsal::{FsalHandle, LocalFsal, path};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Records keyed by path.
pub type Analysis = BTreeMap<String, MetaWrapper>;

/// Receives the result of background work.
pub type Callback = Arc<dyn Fn(Analysis) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`Callback`].
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(Analysis) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |analysis: Analysis| -> BoxFuture<'static, ()> { Box::pin(f(analysis)) })
}

/// Metadata key under [`AUTO_LANGUAGE`] naming a directory's entry point.
const MAIN_KEY: &str = "main";

struct Inner {
    store: Arc<Store>,
    links: LinkIndex,
    processors: Processors,
    fsal: FsalHandle,
    cache: CacheHandle,
    tasks: SchedulerHandle,
    events: EventBusHandle,
    config: ArchiveConfig,
}

#[derive(Clone)]
pub struct Archive {
    inner: Arc<Inner>,
}

impl Archive {
    /// Start building an archive over `db`. Collaborators that are not
    /// supplied get in-process defaults.
    pub fn builder<'a>(db: &'a Database, config: &'a Config) -> ArchiveBuilder<'a> {
        ArchiveBuilder { db, config, fsal: None, cache: None, tasks: None, events: None, processors: None }
    }

    pub fn links(&self) -> &LinkIndex {
        &self.inner.links
    }

    pub fn processors(&self) -> &Processors {
        &self.inner.processors
    }

    pub fn fsal(&self) -> &FsalHandle {
        &self.inner.fsal
    }

    /// Make `path` its directory's entry point if it beats the current one.
    ///
    /// The directory record is created when missing. Its mask keeps every
    /// bit it had and gains `content_type`.
    async fn elect_entry_point(&self, path: &str, content_type: ContentType) -> Result<()> {
        let processor = self.inner.processors.for_type(content_type)?;
        let directory = path::dirname(path).to_string();
        let existing = self.get(directory.as_str(), GetOptions::default().ignore_missing(true)).await?.remove(&directory);
        let mut record = match existing {
            Some(wrapper) => wrapper.into_inner(),
            None => Record::directory(directory.as_str(), ContentTypes::GENERIC),
        };
        let old = record.metadata.get(AUTO_LANGUAGE).and_then(|auto| auto.get(MAIN_KEY)).map(String::as_str);
        if !processor.is_entry_point(path, old) {
            return Ok(());
        }
        let main = path::basename(path).to_string();
        tracing::debug!(%directory, %main, "electing entry point");
        record.metadata.entry(AUTO_LANGUAGE.to_string()).or_default().insert(MAIN_KEY.to_string(), main);
        record.entry_type = EntryType::Directory;
        record.mime_type = None;
        record.content_types |= content_type.flag() | ContentTypes::GENERIC;
        self.save_record(record).await?;
        Ok(())
    }
}

/// Handles [`ENTRY_POINT_FOUND`] for the archive that subscribed it.
struct EntryPointHandler {
    archive: Weak<Inner>,
}

#[async_trait]
impl Subscriber for EntryPointHandler {
    async fn notify(&self, event: &Event) -> Result<()> {
        let Event::EntryPointFound { path, content_type } = event else {
            return Ok(());
        };
        let Some(inner) = self.archive.upgrade() else {
            return Ok(());
        };
        Archive { inner }.elect_entry_point(path, *content_type).await
    }
}

pub struct ArchiveBuilder<'a> {
    db: &'a Database,
    config: &'a Config,
    fsal: Option<FsalHandle>,
    cache: Option<CacheHandle>,
    tasks: Option<SchedulerHandle>,
    events: Option<EventBusHandle>,
    processors: Option<Processors>,
}

impl ArchiveBuilder<'_> {
    pub fn fsal(mut self, fsal: FsalHandle) -> Self {
        self.fsal = Some(fsal);
        self
    }

    pub fn cache(mut self, cache: CacheHandle) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn tasks(mut self, tasks: SchedulerHandle) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn events(mut self, events: EventBusHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn processors(mut self, processors: Processors) -> Self {
        self.processors = Some(processors);
        self
    }

    /// Assemble the archive and subscribe its entry point handler.
    pub fn build(self) -> Result<Archive> {
        let fsal: FsalHandle = match self.fsal {
            Some(fsal) => fsal,
            None => {
                let root = &self.config.library.root;
                Arc::new(LocalFsal::new(root).or_raise(|| ErrorKind::Filesystem(root.display().to_string()))?)
            },
        };
        let store = Arc::new(Store::new(self.db));
        let inner = Arc::new(Inner {
            links: LinkIndex::new(store.clone()),
            store,
            processors: self.processors.unwrap_or_else(|| Processors::new(&self.config.extract)),
            fsal,
            cache: self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
            tasks: self.tasks.unwrap_or_else(|| Arc::new(TokioScheduler::new())),
            events: self.events.unwrap_or_else(|| Arc::new(LocalEventBus::new())),
            config: self.config.archive.clone(),
        });
        inner.events.subscribe(ENTRY_POINT_FOUND, Arc::new(EntryPointHandler { archive: Arc::downgrade(&inner) }));
        Ok(Archive { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exts::TaskQueue;
    use librarian_extract::CannedProber;
    use librarian_fsal::MockFsal;

    const PAGE: &str = "<html><head><title>Site</title></head></html>";

    pub(super) async fn archive(fsal: MockFsal) -> (Archive, TaskQueue) {
        archive_over(Arc::new(fsal)).await
    }

    pub(super) async fn archive_over(fsal: Arc<MockFsal>) -> (Archive, TaskQueue) {
        let db = Database::connect_in_memory().await.unwrap();
        let queue = TaskQueue::new();
        let archive = Archive::builder(&db, &Config::default())
            .fsal(fsal)
            .tasks(Arc::new(queue.clone()))
            .processors(Processors::with_prober(Arc::new(CannedProber::json("{}"))))
            .build()
            .unwrap();
        (archive, queue)
    }

    async fn main_of(archive: &Archive, directory: &str) -> Option<String> {
        let found = archive.get(directory, GetOptions::default().ignore_missing(true)).await.unwrap();
        found.get(directory)?.metadata().get(AUTO_LANGUAGE)?.get(MAIN_KEY).cloned()
    }

    #[tokio::test]
    async fn test_entry_point_creates_directory() {
        let fsal = MockFsal::with_files([("/site/main.html", PAGE)]);
        let (archive, _) = archive(fsal).await;
        archive.analyze("/site/main.html", false).await.unwrap();
        assert_eq!(main_of(&archive, "/site").await.as_deref(), Some("main.html"));
        let site = archive.get("/site", GetOptions::default().ignore_missing(true)).await.unwrap();
        let site = &site["/site"];
        assert_eq!(site.entry_type(), EntryType::Directory);
        assert!(site.content_types().contains(ContentTypes::HTML));
    }

    #[tokio::test]
    async fn test_worse_candidate_is_ignored() {
        let fsal = MockFsal::with_files([("/site/index.html", PAGE), ("/site/start.htm", PAGE)]);
        let (archive, _) = archive(fsal).await;
        archive.analyze(["/site/index.html", "/site/start.htm"], false).await.unwrap();
        assert_eq!(main_of(&archive, "/site").await.as_deref(), Some("index.html"));
    }

    #[tokio::test]
    async fn test_unranked_page_is_not_an_entry_point() {
        let fsal = MockFsal::with_files([("/site/about.html", PAGE)]);
        let (archive, _) = archive(fsal).await;
        archive.analyze("/site/about.html", false).await.unwrap();
        assert_eq!(main_of(&archive, "/site").await, None);
    }
}
