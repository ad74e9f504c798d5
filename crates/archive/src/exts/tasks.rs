use crate::error::{ErrorKind, Result};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A unit of background work. Tasks report their own failures.
pub type Task = BoxFuture<'static, ()>;

pub trait Scheduler: Send + Sync {
    /// Queue `task` to run after `delay`. Callers never see its outcome.
    fn schedule(&self, task: Task, delay: Duration) -> Result<()>;
}

pub type SchedulerHandle = Arc<dyn Scheduler>;

/// Runs tasks on the ambient tokio runtime.
///
/// [`shutdown`](Self::shutdown) lets running tasks finish and drops the ones
/// still waiting on their delay.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks queued or running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    pub async fn shutdown(&self) {
        self.tracker.close();
        self.cancel.cancel();
        self.tracker.wait().await;
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> Result<()> {
        if self.tracker.is_closed() {
            exn::bail!(ErrorKind::Scheduler);
        }
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("shutting down, dropping queued task");
                },
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
        Ok(())
    }
}

/// A FIFO of tasks that only run when driven with
/// [`run_pending`](Self::run_pending). Delays are recorded but not waited on.
#[derive(Clone, Default)]
pub struct TaskQueue {
    queue: Arc<Mutex<VecDeque<(Task, Duration)>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delays of the queued tasks, oldest first.
    pub fn delays(&self) -> Vec<Duration> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).iter().map(|(_, delay)| *delay).collect()
    }

    /// Run queued tasks in order, including any they queue themselves, until
    /// the queue is empty. Returns how many ran.
    pub async fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            let next = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some((task, _delay)) = next else {
                return count;
            };
            task.await;
            count += 1;
        }
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task, delay: Duration) -> Result<()> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push_back((task, delay));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Task {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_queue_runs_in_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            queue.schedule(Box::pin(async move { order.lock().unwrap().push(n) }), Duration::from_millis(n)).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.delays()[2], Duration::from_millis(2));
        assert_eq!(queue.run_pending().await, 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_queue_runs_tasks_queued_by_tasks() {
        let queue = TaskQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = queue.clone();
        let nested = counting(&counter);
        queue
            .schedule(
                Box::pin(async move {
                    inner.schedule(nested, Duration::ZERO).unwrap();
                }),
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(queue.run_pending().await, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_runs_tasks() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(counting(&counter), Duration::ZERO).unwrap();
        scheduler.schedule(counting(&counter), Duration::from_millis(5)).unwrap();
        scheduler.tracker.close();
        scheduler.tracker.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drops_delayed_tasks() {
        let scheduler = TokioScheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(counting(&counter), Duration::from_secs(3600)).unwrap();
        scheduler.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let err = scheduler.schedule(counting(&counter), Duration::ZERO).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Scheduler));
    }
}
