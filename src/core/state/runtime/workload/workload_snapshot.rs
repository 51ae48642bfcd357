use std::collections::{BTreeSet, HashMap};
use chrono::{DateTime, Utc};

/// One deployable unit (a Deployment) as last observed from the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// `namespace/name`
    pub id: String,

    pub namespace: String,

    pub name: String,

    /// Every image referenced by the pod template (init containers included)
    pub image_references: BTreeSet<String>,

    /// Opaque revision token (resource version) of the observed object
    pub current_revision: String,
}

impl WorkloadSpec {
    pub fn new<I, S>(namespace: &str, name: &str, images: I, revision: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: workload_id(namespace, name),
            namespace: namespace.to_string(),
            name: name.to_string(),
            image_references: images.into_iter().map(Into::into).collect(),
            current_revision: revision.to_string(),
        }
    }
}

/// Canonical workload identifier.
pub fn workload_id(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Immutable point-in-time view of all known workloads.
///
/// A snapshot is never mutated once published:
/// - every refresh derives a new value (`with_applied`, `without`, `rebuilt`)
/// - `version` strictly increases along a chain of derived snapshots
#[derive(Debug, Clone)]
pub struct WorkloadSnapshot {
    pub version: u64,
    pub refreshed_at: DateTime<Utc>,

    /// Workloads keyed by id for O(1) lookup
    workloads: HashMap<String, WorkloadSpec>,
}

impl Default for WorkloadSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            refreshed_at: Utc::now(),
            workloads: HashMap::new(),
        }
    }
}

impl WorkloadSnapshot {
    /// Build a snapshot from a full listing.
    pub fn from_workloads(version: u64, workloads: Vec<WorkloadSpec>) -> Self {
        Self {
            version,
            refreshed_at: Utc::now(),
            workloads: workloads.into_iter().map(|w| (w.id.clone(), w)).collect(),
        }
    }

    /// Next generation built from a fresh full listing.
    pub fn rebuilt(&self, workloads: Vec<WorkloadSpec>) -> Self {
        Self::from_workloads(self.version + 1, workloads)
    }

    /// Next generation with one workload inserted or replaced.
    pub fn with_applied(&self, workload: WorkloadSpec) -> Self {
        let mut workloads = self.workloads.clone();
        workloads.insert(workload.id.clone(), workload);

        Self {
            version: self.version + 1,
            refreshed_at: Utc::now(),
            workloads,
        }
    }

    /// Next generation without the given workload.
    pub fn without(&self, id: &str) -> Self {
        let mut workloads = self.workloads.clone();
        workloads.remove(id);

        Self {
            version: self.version + 1,
            refreshed_at: Utc::now(),
            workloads,
        }
    }

    pub fn get(&self, id: &str) -> Option<&WorkloadSpec> {
        self.workloads.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workloads.contains_key(id)
    }

    pub fn workloads(&self) -> impl Iterator<Item = &WorkloadSpec> {
        self.workloads.values()
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }
}
