//! Collaborators the archive talks to but does not own: a cache, a task
//! scheduler and an event bus. Each is a trait with an in-process
//! implementation.

mod cache;
mod events;
mod tasks;

pub use self::cache::{Cache, CacheHandle, MemoryCache};
pub use self::events::{ENTRY_POINT_FOUND, Event, EventBus, EventBusHandle, FS_EVENT, LocalEventBus, Subscriber};
pub use self::tasks::{Scheduler, SchedulerHandle, Task, TaskQueue, TokioScheduler};
