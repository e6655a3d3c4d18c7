//! Fan-out of status snapshots to connected viewers.
//!
//! Built on a `watch` channel: the broadcaster holds the latest snapshot
//! list and every subscriber owns a receiver. A slow subscriber coalesces
//! to the newest value instead of queueing stale ones, so delivery to a
//! dead or slow viewer never blocks the publisher or other subscribers.
//! Dropping the receiver is all the cleanup a disconnect needs, so repeated
//! connect/disconnect cycles accumulate no state.

use tokio::sync::watch;

use crate::supervisor::record::ProcessSnapshot;

pub struct StatusBroadcaster {
    tx: watch::Sender<Vec<ProcessSnapshot>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Replace the current snapshot list and wake every subscriber.
    /// Never blocks.
    pub fn publish(&self, snapshots: Vec<ProcessSnapshot>) {
        self.tx.send_replace(snapshots);
    }

    /// New subscribers see the current snapshot immediately via
    /// `borrow_and_update` on the returned receiver.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ProcessSnapshot>> {
        self.tx.subscribe()
    }

    /// The most recent snapshot list, for explicit re-query requests.
    pub fn latest(&self) -> Vec<ProcessSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
