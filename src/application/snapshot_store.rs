//! Versioned, swap-on-publish holder of the last published snapshot.

use crate::domain::Snapshot;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Single owner of the "last published snapshot".
///
/// Publication is a compare-and-swap on `Snapshot::sequence`: a snapshot is
/// only installed if it is newer than the current one, so a slow cycle can
/// never overwrite the result of a faster, later cycle. Readers always see a
/// complete `Arc<Snapshot>`.
pub struct SnapshotStore {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Install `snapshot` if its sequence is greater than the current one.
    ///
    /// Returns `false` when the snapshot was stale and dropped.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> bool {
        let sequence = snapshot.sequence;
        let installed = self.tx.send_if_modified(|current| match current {
            Some(existing) if existing.sequence >= sequence => false,
            _ => {
                *current = Some(snapshot.clone());
                true
            }
        });
        if !installed {
            debug!(sequence, "Dropped stale snapshot");
        }
        installed
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every successful publication.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.tx.subscribe()
    }
}
