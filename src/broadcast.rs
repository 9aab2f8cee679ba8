use std::{
    pin::Pin,
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use ahash::AHashMap;
use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::Event;

/// Process-unique subscriber token. Never persisted; ids restart with the process.
pub type SubscriberId = u64;

/// How many undelivered events a subscriber may buffer before it is
/// considered stalled and pruned.
const SUBSCRIBER_BUFFER: usize = 64;

type Registry = AHashMap<SubscriberId, mpsc::Sender<Event>>;

/// Registry of live streaming subscribers plus the fan-out routine.
///
/// Each subscriber owns the receiving half of a bounded channel; the hub
/// holds the only sender. `publish` never blocks: every push is a
/// `try_send`, and a push that fails (receiver gone, or buffer full on a
/// stalled client) prunes that subscriber without affecting the others.
pub struct BroadcastHub {
    subscribers: RwLock<Registry>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(AHashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber.
    ///
    /// The returned [`Subscription`] yields pushed events and deregisters
    /// itself when dropped, so a subscriber cannot outlive its connection.
    /// Callers replay catch-up history themselves right after subscribing;
    /// an event published in between may therefore arrive twice, which
    /// display-only receivers are expected to tolerate.
    pub fn subscribe(self: Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.register(tx);
        Subscription { hub: self, id, rx }
    }

    /// Pushes `event` to every live subscriber and returns how many took it.
    ///
    /// The subscriber set is snapshotted before iterating, so a concurrent
    /// subscribe or unsubscribe neither blocks the loop nor double-notifies.
    pub fn publish(&self, event: &Event) -> usize {
        let targets: Vec<(SubscriberId, mpsc::Sender<Event>)> = self
            .read_registry()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!(subscriber = id, "push failed, pruning subscriber");
                    self.unsubscribe(id);
                }
            }
        }
        delivered
    }

    /// Removes a subscriber. Idempotent; safe concurrently with `publish`.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.write_registry().remove(&id).is_some() {
            debug!(subscriber = id, "subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.read_registry().len()
    }

    fn register(&self, tx: mpsc::Sender<Event>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write_registry().insert(id, tx);
        debug!(subscriber = id, "subscriber registered");
        id
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscriber's receiving end.
///
/// Implements [`Stream`]. Dropping it deregisters the subscriber, which is
/// how a client disconnect reaches the registry even when no publish ever
/// touches the dead sink.
pub struct Subscription {
    hub: Arc<BroadcastHub>,
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
