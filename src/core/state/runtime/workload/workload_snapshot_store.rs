use std::sync::Arc;
use tokio::sync::watch;

use crate::core::state::runtime::workload::workload_snapshot::WorkloadSnapshot;

/// Single-writer publication point for the current `WorkloadSnapshot`.
///
/// Readers clone the `Arc` and keep a consistent view for as long as they need;
/// writers always publish a whole new snapshot.
pub struct WorkloadSnapshotStore {
    tx: watch::Sender<Arc<WorkloadSnapshot>>,
}

impl WorkloadSnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(WorkloadSnapshot::default()));
        Self { tx }
    }

    /// Return the shared Arc snapshot (zero cost).
    pub fn get(&self) -> Arc<WorkloadSnapshot> {
        self.tx.borrow().clone()
    }

    /// Replace the entire snapshot atomically.
    pub fn set(&self, snapshot: WorkloadSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    /// Derive the next snapshot from the current one and publish it.
    pub fn update<F>(&self, f: F) -> Arc<WorkloadSnapshot>
    where
        F: FnOnce(&WorkloadSnapshot) -> WorkloadSnapshot,
    {
        let mut published = None;
        self.tx.send_modify(|current| {
            let next = Arc::new(f(current));
            published = Some(next.clone());
            *current = next;
        });
        published.unwrap_or_else(|| self.get())
    }
}

impl Default for WorkloadSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
