//! Rollout controller: owns the workload snapshot, keeps it fresh from the
//! cluster, and turns trigger requests into rollout patches.
//!
//! Lifecycle is `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//! While running:
//! - `current_snapshot` hands out the latest immutable snapshot without I/O
//! - `trigger` dispatches at most one patch per workload at a time, and at
//!   most `max_in_flight` patches overall
//! - a background task applies watch events and periodic full resyncs

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::RolloutSettings;
use crate::core::client::cluster::{ClusterClient, ClusterConnector, RolloutPatch, WorkloadEvent};
use crate::core::state::runtime::workload::workload_snapshot::{WorkloadSnapshot, WorkloadSpec};
use crate::core::state::runtime::workload::workload_snapshot_store::WorkloadSnapshotStore;
use crate::core::util::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::event::push_event::PushEvent;

/// Upper bound for tasks to unwind once they have been told to cancel.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Attempts for one periodic resync listing.
const RESYNC_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A patch task was started
    Dispatched,
    /// A patch for the same workload is already in flight
    Coalesced,
    /// The controller is not running
    Rejected,
}

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("cluster unavailable: {0:#}")]
    ClusterUnavailable(anyhow::Error),

    #[error("controller is {actual:?}, expected {expected:?}")]
    InvalidState {
        actual: ControllerState,
        expected: ControllerState,
    },
}

/// One pending trigger; lives until its patch call returns.
#[derive(Debug, Clone)]
pub struct RolloutRequest {
    pub workload_id: String,
    pub reason: PushEvent,
}

/// Handles only valid while running.
struct ActiveRollout {
    client: Arc<dyn ClusterClient>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

struct RefreshTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RolloutController {
    connector: Arc<dyn ClusterConnector>,
    settings: RolloutSettings,
    snapshots: Arc<WorkloadSnapshotStore>,
    state: watch::Sender<ControllerState>,
    active: RwLock<Option<ActiveRollout>>,
    /// Serializes start/stop
    refresh: tokio::sync::Mutex<Option<RefreshTask>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    permits: Arc<Semaphore>,
}

impl RolloutController {
    pub fn new(connector: Arc<dyn ClusterConnector>, settings: RolloutSettings) -> Self {
        let (state, _) = watch::channel(ControllerState::Stopped);
        let permits = Arc::new(Semaphore::new(settings.max_in_flight.max(1)));

        Self {
            connector,
            settings,
            snapshots: Arc::new(WorkloadSnapshotStore::new()),
            state,
            active: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(None),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            permits,
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ControllerState::Running
    }

    /// Observe lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    /// Latest immutable snapshot; never waits on the cluster.
    pub fn current_snapshot(&self) -> Arc<WorkloadSnapshot> {
        self.snapshots.get()
    }

    /// Workloads with a patch currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Connect, build the first snapshot and start the refresh task.
    pub async fn start(&self) -> Result<(), RolloutError> {
        let mut refresh = self.refresh.lock().await;

        let actual = self.state();
        if actual != ControllerState::Stopped {
            return Err(RolloutError::InvalidState {
                actual,
                expected: ControllerState::Stopped,
            });
        }
        self.state.send_replace(ControllerState::Starting);
        info!("Starting rollout controller...");

        let (client, workloads) = match self.connect_and_list().await {
            Ok(connected) => connected,
            Err(e) => {
                self.state.send_replace(ControllerState::Stopped);
                return Err(RolloutError::ClusterUnavailable(e));
            }
        };

        let snapshot = self.snapshots.update(|current| current.rebuilt(workloads));
        info!(
            version = snapshot.version,
            workloads = snapshot.len(),
            "Initial workload snapshot built"
        );

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_refresh(
            client.clone(),
            self.snapshots.clone(),
            self.settings.resync_interval,
            shutdown.clone(),
        ));

        *write(&self.active) = Some(ActiveRollout {
            client,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        });
        *refresh = Some(RefreshTask { shutdown, handle });

        self.state.send_replace(ControllerState::Running);
        info!("Rollout controller running");
        Ok(())
    }

    async fn connect_and_list(&self) -> anyhow::Result<(Arc<dyn ClusterClient>, Vec<WorkloadSpec>)> {
        let client = self.connector.connect().await?;
        let workloads = client.list_workloads().await?;
        Ok((client, workloads))
    }

    /// Stop accepting triggers, cancel the refresh task, drain in-flight
    /// patches for at most the drain timeout and release the cluster client.
    ///
    /// No-op unless running.
    pub async fn stop(&self) {
        let mut refresh = self.refresh.lock().await;

        if self.state() != ControllerState::Running {
            debug!(state = ?self.state(), "stop requested while not running");
            return;
        }
        self.state.send_replace(ControllerState::Stopping);
        info!("Stopping rollout controller...");

        // from here on trigger() rejects
        let active = write(&self.active).take();

        if let Some(task) = refresh.take() {
            task.shutdown.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "workload refresh task ended abnormally");
            }
        }

        if let Some(active) = active {
            active.tasks.close();

            if tokio::time::timeout(self.settings.drain_timeout, active.tasks.wait())
                .await
                .is_err()
            {
                warn!(
                    remaining = active.tasks.len(),
                    "drain timeout elapsed, cancelling in-flight rollouts"
                );
                active.cancel.cancel();
                if tokio::time::timeout(CANCEL_GRACE, active.tasks.wait()).await.is_err() {
                    error!(remaining = active.tasks.len(), "rollout tasks ignored cancellation");
                }
            }

            // releases the cluster connection once the last task is gone
            drop(active.client);
        }

        self.state.send_replace(ControllerState::Stopped);
        info!("Rollout controller stopped");
    }

    /// Request a rolling update of one workload.
    pub fn trigger(&self, workload_id: &str, reason: &PushEvent) -> TriggerOutcome {
        let active = read(&self.active);
        let Some(active) = active.as_ref() else {
            debug!(workload = %workload_id, "trigger rejected, controller not running");
            return TriggerOutcome::Rejected;
        };

        if !lock(&self.in_flight).insert(workload_id.to_string()) {
            info!(workload = %workload_id, image = %reason, "rollout already in flight, coalescing");
            return TriggerOutcome::Coalesced;
        }

        let guard = InFlightGuard {
            set: self.in_flight.clone(),
            workload_id: workload_id.to_string(),
        };

        let task = RolloutTask {
            request: RolloutRequest {
                workload_id: workload_id.to_string(),
                reason: reason.clone(),
            },
            client: active.client.clone(),
            snapshots: self.snapshots.clone(),
            permits: self.permits.clone(),
            policy: RetryPolicy {
                attempts: self.settings.patch_attempts,
                initial_delay: self.settings.retry_initial_delay,
                max_delay: self.settings.retry_max_delay,
                ..Default::default()
            },
            cancel: active.cancel.clone(),
        };

        active.tasks.spawn(task.run(guard));
        debug!(workload = %workload_id, "rollout dispatched");
        TriggerOutcome::Dispatched
    }
}

/// Removes the workload from the in-flight set however the task ends.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    workload_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.workload_id);
    }
}

struct RolloutTask {
    request: RolloutRequest,
    client: Arc<dyn ClusterClient>,
    snapshots: Arc<WorkloadSnapshotStore>,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RolloutTask {
    async fn run(self, _guard: InFlightGuard) {
        let RolloutRequest { workload_id, reason } = &self.request;

        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!(workload = %workload_id, "rollout cancelled while queued");
                return;
            }
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        // latest known spec, read only once we are allowed to act
        let Some(workload) = self.snapshots.get().get(workload_id).cloned() else {
            info!(workload = %workload_id, "workload no longer exists, skipping rollout");
            return;
        };

        let patch = RolloutPatch::new(reason.to_string());
        let client = &self.client;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!(workload = %workload_id, "rollout cancelled during shutdown");
                return;
            }
            result = retry_with_backoff(&self.policy, "rollout patch", || {
                client.patch_workload(&workload, &patch)
            }) => result,
        };

        match result {
            Ok(()) => info!(
                workload = %workload_id,
                image = %reason,
                revision = %workload.current_revision,
                "rollout triggered"
            ),
            Err(e) => error!(
                workload = %workload_id,
                image = %reason,
                error = %format!("{e:#}"),
                "rollout abandoned after retries"
            ),
        }
    }
}

async fn run_refresh(
    client: Arc<dyn ClusterClient>,
    snapshots: Arc<WorkloadSnapshotStore>,
    resync_interval: Duration,
    shutdown: CancellationToken,
) {
    info!("Workload refresh started");

    let mut changes = client.watch_workloads();
    let mut watching = true;

    let mut resync = tokio::time::interval_at(Instant::now() + resync_interval, resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let policy = RetryPolicy::with_attempts(RESYNC_ATTEMPTS);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            change = changes.next(), if watching => match change {
                Some(Ok(event)) => {
                    let snapshot = apply_change(&snapshots, event);
                    debug!(version = snapshot.version, workloads = snapshot.len(), "snapshot updated from watch");
                }
                Some(Err(e)) => warn!(error = %format!("{e:#}"), "workload watch error"),
                None => {
                    warn!("workload watch ended, relying on periodic resync");
                    watching = false;
                }
            },

            _ = resync.tick() => {
                let listing = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    listing = retry_with_backoff(&policy, "workload resync", || client.list_workloads()) => listing,
                };

                match listing {
                    Ok(workloads) => {
                        let snapshot = snapshots.update(|current| current.rebuilt(workloads));
                        debug!(version = snapshot.version, workloads = snapshot.len(), "snapshot resynced");
                    }
                    Err(e) => error!(error = %format!("{e:#}"), "workload resync failed, keeping previous snapshot"),
                }
            }
        }
    }

    info!("Workload refresh stopped");
}

fn apply_change(snapshots: &WorkloadSnapshotStore, event: WorkloadEvent) -> Arc<WorkloadSnapshot> {
    match event {
        WorkloadEvent::Applied(workload) => {
            snapshots.update(|current| current.with_applied(workload))
        }
        WorkloadEvent::Deleted(id) => {
            let current = snapshots.get();
            if !current.contains(&id) {
                return current;
            }
            snapshots.update(|current| current.without(&id))
        }
        WorkloadEvent::Restarted(workloads) => {
            snapshots.update(|current| current.rebuilt(workloads))
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
