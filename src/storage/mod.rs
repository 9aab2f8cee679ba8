mod bounded_log;

use crate::event::Event;

pub use bounded_log::BoundedLog;

/// Storage trait for the event history.
///
/// The store is a process-lifetime buffer, not durable storage: appends
/// cannot fail and snapshots always succeed.
#[async_trait::async_trait]
pub trait EventStore {
    /// Commits an event, evicting the oldest entries once capacity is exceeded.
    async fn append(&self, event: Event);

    /// All retained events, newest first.
    async fn snapshot(&self) -> Vec<Event>;

    /// At most the `n` newest events, newest first. Used for stream catch-up.
    async fn snapshot_recent(&self, n: usize) -> Vec<Event>;
}
