use super::{Analysis, Archive, Callback};
use crate::batch::{ANALYZE_BATCH, IntoPaths, batched};
use crate::error::{ErrorKind, Result};
use crate::exts::{Event, Task};
use crate::wrapper::MetaWrapper;
use exn::ResultExt;
use librarian_fsal::path;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::instrument;

impl Archive {
    /// Run every matching processor over each path and return one record
    /// per path.
    ///
    /// Paths are not written to the database; pass the result to
    /// [`save_many`](Self::save_many) for that. Entry point elections are
    /// the exception: they are handled, and stored, before this returns.
    #[instrument(skip(self, paths))]
    pub async fn analyze(&self, paths: impl IntoPaths, partial: bool) -> Result<Analysis> {
        let paths = paths.into_paths();
        batched(&paths, ANALYZE_BATCH, |batch| self.analyze_batch(batch, partial)).await
    }

    /// Schedule [`analyze`](Self::analyze) and hand its result to
    /// `callback`. Returns once the task is queued.
    pub fn analyze_in_background(&self, paths: impl IntoPaths, partial: bool, callback: Callback) -> Result<()> {
        let paths = paths.into_paths();
        if paths.is_empty() {
            return Ok(());
        }
        let archive = self.clone();
        let task: Task = Box::pin(async move {
            match archive.analyze(paths, partial).await {
                Ok(analysis) => callback(analysis).await,
                Err(err) => tracing::error!(error = ?err, "background analysis failed"),
            }
        });
        self.inner.tasks.schedule(task, Duration::ZERO)
    }

    async fn analyze_batch(&self, paths: &[String], partial: bool) -> Result<Analysis> {
        let mut records = BTreeMap::new();
        for raw in paths {
            let path = path::normalize(raw).or_raise(|| ErrorKind::InvalidPath(raw.clone()))?;
            for processor in self.inner.processors.for_path(&path)? {
                processor.process(self.inner.fsal.as_ref(), &self.inner.links, &path, partial, &mut records).await?;
                if processor.is_entry_point(&path, None) {
                    let event = Event::EntryPointFound { path: path.clone(), content_type: processor.content_type() };
                    self.inner.events.publish(event).await;
                }
            }
        }
        tracing::debug!(count = records.len(), "analyzed");
        Ok(records.into_iter().map(|(path, record)| (path, MetaWrapper::new(record))).collect())
    }
}
