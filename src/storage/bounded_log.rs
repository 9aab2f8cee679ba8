use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::{event::Event, storage::EventStore};

/// Fixed-capacity, FIFO-evicting in-memory event log.
///
/// Events are held oldest-first internally; readers always get them newest
/// first. A single lock over the deque keeps appends and snapshots
/// consistent, so a reader never observes a half-applied eviction.
pub struct BoundedLog {
    capacity: usize,
    events: RwLock<VecDeque<Event>>,
}

impl BoundedLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }
}

#[async_trait::async_trait]
impl EventStore for BoundedLog {
    #[instrument(skip_all)]
    async fn append(&self, event: Event) {
        let mut events = self.events.write().await;
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
        debug!(retained = events.len(), "event appended");
    }

    #[instrument(skip_all)]
    async fn snapshot(&self) -> Vec<Event> {
        let events = self.events.read().await;
        events.iter().rev().cloned().collect()
    }

    #[instrument(skip_all)]
    async fn snapshot_recent(&self, n: usize) -> Vec<Event> {
        let events = self.events.read().await;
        events.iter().rev().take(n).cloned().collect()
    }
}
