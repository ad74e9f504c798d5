use super::{Analysis, Archive, Callback};
use crate::error::Result;
use crate::exts::Task;
use async_stream::stream;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use librarian_fsal::DirListing;
use std::time::Duration;

/// Where and how deep to scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Directory to start from; the library root by default.
    pub path: String,
    pub partial: bool,
    /// Deepest level to descend to, counted like `depth`. `Some(0)` scans
    /// `path` alone.
    pub maxdepth: Option<usize>,
    pub depth: usize,
    /// Wait between scheduled sub-directory scans. Blocking scans ignore it.
    pub delay: Duration,
}

impl ScanOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn maxdepth(mut self, maxdepth: usize) -> Self {
        self.maxdepth = Some(maxdepth);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn at_limit(&self) -> bool {
        self.maxdepth.is_some_and(|maxdepth| self.depth >= maxdepth)
    }

    fn descend(&self, path: String) -> Self {
        Self { path, depth: self.depth + 1, ..self.clone() }
    }
}

impl Archive {
    /// Walk the tree under `options.path`, yielding the analysis of each
    /// directory's files before descending into its subdirectories.
    ///
    /// A directory that cannot be listed, or whose files cannot be
    /// analyzed, ends its branch of the walk with a warning.
    pub fn scan(&self, options: ScanOptions) -> BoxStream<'static, Analysis> {
        let archive = self.clone();
        stream! {
            let Some(listing) = archive.list(&options.path).await else {
                return;
            };
            let files: Vec<String> = listing.files.into_iter().map(|file| file.rel_path).collect();
            match archive.analyze(files, options.partial).await {
                Ok(analysis) => yield analysis,
                Err(err) => {
                    tracing::warn!(path = %options.path, error = ?err, "scan stopped");
                    return;
                },
            }
            if options.at_limit() {
                return;
            }
            for dir in listing.dirs {
                for await analysis in archive.scan(options.descend(dir.rel_path)) {
                    yield analysis;
                }
            }
        }
        .boxed()
    }

    /// Analyze one directory level, hand the result to `callback`, then
    /// schedule a scan of each subdirectory `options.delay` apart.
    pub fn scan_with_callback(&self, options: ScanOptions, callback: Callback) -> BoxFuture<'static, Result<()>> {
        let archive = self.clone();
        Box::pin(async move {
            let Some(listing) = archive.list(&options.path).await else {
                return Ok(());
            };
            let files: Vec<String> = listing.files.into_iter().map(|file| file.rel_path).collect();
            let analysis = match archive.analyze(files, options.partial).await {
                Ok(analysis) => analysis,
                Err(err) => {
                    tracing::warn!(path = %options.path, error = ?err, "scan stopped");
                    return Ok(());
                },
            };
            callback(analysis).await;
            if options.at_limit() {
                return Ok(());
            }
            for dir in listing.dirs {
                let (sub, next, callback) = (archive.clone(), options.descend(dir.rel_path), callback.clone());
                let task: Task = Box::pin(async move {
                    let path = next.path.clone();
                    if let Err(err) = sub.scan_with_callback(next, callback).await {
                        tracing::error!(%path, error = ?err, "background scan failed");
                    }
                });
                archive.inner.tasks.schedule(task, options.delay)?;
            }
            Ok(())
        })
    }

    async fn list(&self, path: &str) -> Option<DirListing> {
        match self.inner.fsal.list_dir(path).await {
            Ok(listing) => Some(listing),
            Err(err) => {
                tracing::warn!(path, error = ?err, "scan stopped");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::callback;
    use crate::archive::tests::archive;
    use librarian_fsal::MockFsal;
    use std::sync::{Arc, Mutex};

    fn tree() -> MockFsal {
        MockFsal::with_files([
            ("/lib/top.txt", "x"),
            ("/lib/a/one.txt", "x"),
            ("/lib/a/deep/two.txt", "x"),
            ("/lib/b/three.txt", "x"),
        ])
    }

    fn keys(levels: &[Analysis]) -> Vec<Vec<String>> {
        levels.iter().map(|level| level.keys().cloned().collect()).collect()
    }

    #[tokio::test]
    async fn test_scan_walks_depth_first() {
        let (archive, _) = archive(tree()).await;
        let levels: Vec<Analysis> = archive.scan(ScanOptions::new("/lib").partial(true)).collect().await;
        assert_eq!(
            keys(&levels),
            vec![
                vec!["/lib/top.txt".to_string()],
                vec!["/lib/a/one.txt".to_string()],
                vec!["/lib/a/deep/two.txt".to_string()],
                vec!["/lib/b/three.txt".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_maxdepth() {
        let (archive, _) = archive(tree()).await;
        let levels: Vec<Analysis> = archive.scan(ScanOptions::new("/lib").maxdepth(0)).collect().await;
        assert_eq!(keys(&levels), vec![vec!["/lib/top.txt".to_string()]]);
        let levels: Vec<Analysis> = archive.scan(ScanOptions::new("/lib").maxdepth(1)).collect().await;
        assert_eq!(levels.len(), 3);
    }

    #[tokio::test]
    async fn test_scan_missing_directory() {
        let (archive, _) = archive(tree()).await;
        let levels: Vec<Analysis> = archive.scan(ScanOptions::new("/nope")).collect().await;
        assert!(levels.is_empty());
    }

    #[tokio::test]
    async fn test_scan_with_callback_schedules_subdirectories() {
        let (archive, queue) = archive(tree()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let record = callback(move |analysis| {
            sink.lock().unwrap().extend(analysis.into_keys());
            async {}
        });
        let options = ScanOptions::new("/lib").partial(true).delay(Duration::from_millis(250));
        archive.scan_with_callback(options, record).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["/lib/top.txt".to_string()]);
        assert_eq!(queue.delays(), vec![Duration::from_millis(250); 2]);
        assert_eq!(queue.run_pending().await, 3);
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["/lib/a/deep/two.txt", "/lib/a/one.txt", "/lib/b/three.txt", "/lib/top.txt"]);
    }
}
