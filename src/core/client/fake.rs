//! In-memory cluster used by tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::core::client::cluster::{ClusterClient, ClusterConnector, RolloutPatch, WorkloadEvent};
use crate::core::state::runtime::workload::workload_snapshot::WorkloadSpec;

#[derive(Debug, Clone)]
pub struct RecordedPatch {
    pub workload_id: String,
    pub revision: String,
    pub patch: RolloutPatch,
}

#[derive(Default)]
struct Inner {
    workloads: Mutex<Vec<WorkloadSpec>>,
    patches: Mutex<Vec<RecordedPatch>>,
    patch_failures: Mutex<VecDeque<String>>,
    watch_tx: Mutex<Option<mpsc::UnboundedSender<Result<WorkloadEvent>>>>,
    /// Events emitted before a watch stream was opened
    queued: Mutex<Vec<WorkloadEvent>>,
    unreachable: AtomicBool,
    patch_attempts: AtomicUsize,
    active_patches: AtomicUsize,
    max_active_patches: AtomicUsize,
    connections: AtomicUsize,
    /// When set, each patch call waits for one permit before returning
    gate: Mutex<Option<Arc<Semaphore>>>,
}

/// Cheaply cloneable handle; clones share state.
#[derive(Clone, Default)]
pub struct FakeCluster {
    inner: Arc<Inner>,
}

impl FakeCluster {
    pub fn with_workloads(workloads: Vec<WorkloadSpec>) -> Self {
        let fake = Self::default();
        *fake.inner.workloads.lock().unwrap() = workloads;
        fake
    }

    pub fn set_workloads(&self, workloads: Vec<WorkloadSpec>) {
        *self.inner.workloads.lock().unwrap() = workloads;
    }

    /// Every connect attempt fails.
    pub fn unreachable(self) -> Self {
        self.inner.unreachable.store(true, Ordering::SeqCst);
        self
    }

    /// The next `n` patch calls fail.
    pub fn fail_next_patches(&self, n: usize) {
        let mut failures = self.inner.patch_failures.lock().unwrap();
        for i in 0..n {
            failures.push_back(format!("injected failure {}", i + 1));
        }
    }

    /// Hold patch calls until `release_patches` hands out permits.
    pub fn gate_patches(&self) {
        *self.inner.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_patches(&self, n: usize) {
        if let Some(gate) = self.inner.gate.lock().unwrap().as_ref() {
            gate.add_permits(n);
        }
    }

    /// Push an event into the watch stream, queueing it until one is open.
    pub fn emit(&self, event: WorkloadEvent) {
        match self.inner.watch_tx.lock().unwrap().as_ref() {
            Some(tx) => {
                let _ = tx.unbounded_send(Ok(event));
            }
            None => self.inner.queued.lock().unwrap().push(event),
        }
    }

    pub fn patches(&self) -> Vec<RecordedPatch> {
        self.inner.patches.lock().unwrap().clone()
    }

    pub fn patch_attempts(&self) -> usize {
        self.inner.patch_attempts.load(Ordering::SeqCst)
    }

    pub fn max_active_patches(&self) -> usize {
        self.inner.max_active_patches.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Wait until `n` patch calls have started (bounded, for tests).
    pub async fn wait_for_patch_attempts(&self, n: usize) {
        for _ in 0..500 {
            if self.patch_attempts() >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("expected {} patch attempts, saw {}", n, self.patch_attempts());
    }
}

#[async_trait]
impl ClusterConnector for FakeCluster {
    async fn connect(&self) -> Result<Arc<dyn ClusterClient>> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_workloads(&self) -> Result<Vec<WorkloadSpec>> {
        Ok(self.inner.workloads.lock().unwrap().clone())
    }

    async fn patch_workload(&self, workload: &WorkloadSpec, patch: &RolloutPatch) -> Result<()> {
        self.inner.patch_attempts.fetch_add(1, Ordering::SeqCst);
        let active = self.inner.active_patches.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active_patches.fetch_max(active, Ordering::SeqCst);

        let gate = self.inner.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.inner.active_patches.fetch_sub(1, Ordering::SeqCst);

        if let Some(reason) = self.inner.patch_failures.lock().unwrap().pop_front() {
            return Err(anyhow!(reason));
        }

        self.inner.patches.lock().unwrap().push(RecordedPatch {
            workload_id: workload.id.clone(),
            revision: workload.current_revision.clone(),
            patch: patch.clone(),
        });
        Ok(())
    }

    fn watch_workloads(&self) -> BoxStream<'static, Result<WorkloadEvent>> {
        let (tx, rx) = mpsc::unbounded();
        let mut watch_tx = self.inner.watch_tx.lock().unwrap();
        for event in self.inner.queued.lock().unwrap().drain(..) {
            let _ = tx.unbounded_send(Ok(event));
        }
        *watch_tx = Some(tx);
        rx.boxed()
    }
}
