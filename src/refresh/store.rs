use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::models::Snapshot;

const SUBSCRIBER_BUFFER: usize = 16;

/// Holds the one current [`Snapshot`].
///
/// Readers get an `Arc` to an immutable snapshot, so a read is either the old
/// value or the new one, never a mix. Publishing swaps the pointer and fans
/// the same `Arc` out to broadcast subscribers, in publish order.
pub struct StateStore {
    current: watch::Sender<Arc<Snapshot>>,
    updates: broadcast::Sender<Arc<Snapshot>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (updates, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self { current, updates }
    }

    pub fn read(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.borrow())
    }

    /// Receiver that always holds the latest snapshot; intermediate ones may
    /// be skipped.
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.current.subscribe()
    }

    /// Receiver of every published snapshot. A subscriber that falls more
    /// than a few publishes behind sees `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.updates.subscribe()
    }

    /// Installs `snapshot` if its version is newer than the current one.
    /// Returns false, leaving the store untouched, otherwise.
    pub fn publish(&self, snapshot: impl Into<Arc<Snapshot>>) -> bool {
        let next = snapshot.into();
        self.current.send_if_modified(|current| {
            if next.version <= current.version {
                return false;
            }
            *current = Arc::clone(&next);
            // No subscribers is not an error.
            let _ = self.updates.send(Arc::clone(&next));
            true
        })
    }
}
