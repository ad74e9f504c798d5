use crate::contenttypes::ContentType;
use crate::error::Result;
use async_trait::async_trait;
use librarian_fsal::FsChange;
use std::sync::{Arc, PoisonError, RwLock};

/// Published when a processor sees a file it could open as its directory's
/// default view.
pub const ENTRY_POINT_FOUND: &str = "entry_point_found";
/// Republished FSAL change notifications.
pub const FS_EVENT: &str = "fs_event";

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EntryPointFound { path: String, content_type: ContentType },
    FsEvent(FsChange),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EntryPointFound { .. } => ENTRY_POINT_FOUND,
            Self::FsEvent(_) => FS_EVENT,
        }
    }
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn notify(&self, event: &Event) -> Result<()>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    fn subscribe(&self, name: &'static str, subscriber: Arc<dyn Subscriber>);

    /// Deliver `event` to its subscribers, one after the other, before
    /// returning. Subscriber failures are logged, not returned.
    async fn publish(&self, event: Event);
}

pub type EventBusHandle = Arc<dyn EventBus>;

#[derive(Default)]
pub struct LocalEventBus {
    subscribers: RwLock<Vec<(&'static str, Arc<dyn Subscriber>)>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    fn subscribe(&self, name: &'static str, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner).push((name, subscriber));
    }

    async fn publish(&self, event: Event) {
        let name = event.name();
        let subscribers: Vec<_> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(subscribed, _)| *subscribed == name)
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            if let Err(err) = subscriber.notify(&event).await {
                tracing::error!(event = name, error = ?err, "event subscriber failed");
            }
        }
    }
}
