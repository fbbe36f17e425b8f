//! Event bus for broadcasting leadership lifecycle events.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] channel and is the **single
//! stamping point** for event sequence numbers: every event gets its `seq`
//! assigned at publish time, so subscribers can totally order events coming
//! from any mix of producers (the leader core, the driver worker, the
//! service shell) even when delivery interleaves across async channels.
//!
//! - [`Bus::publish`] stamps and sends an event to all subscribers
//!   (non-blocking).
//! - [`Bus::subscribe`] creates a new receiver for consuming events.
//!
//! Clones share the sequence counter, so events published through any
//! handle order consistently. Subscribers are read-only observers: nothing
//! received from the bus may mutate core leadership state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::trace;

use crate::events::Event;

/// Broadcast channel and sequence authority for lifecycle events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    seq: Arc<AtomicU64>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stamps the event with the next sequence number and broadcasts it.
    ///
    /// Lifecycle events are best-effort: with no active subscribers the
    /// event is dropped.
    pub fn publish(&self, mut ev: Event) {
        ev.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(ev).is_err() {
            trace!("no subscribers, lifecycle event dropped");
        }
    }

    /// Subscribes to the bus and returns a new receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn publish_stamps_monotonic_seq_across_clones() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let clone = bus.clone();

        bus.publish(Event::new(EventKind::OfferScheduled));
        clone.publish(Event::new(EventKind::Standby));

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!((a.seq, b.seq), (0, 1));
        assert_eq!(a.kind, EventKind::OfferScheduled);
        assert_eq!(b.kind, EventKind::Standby);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::ShutdownRequested));

        // The counter still advances so later events keep a total order.
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::Standby));
        assert_eq!(rx.recv().await.unwrap().seq, 1);
    }
}
