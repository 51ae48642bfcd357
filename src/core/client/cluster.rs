//! Cluster collaborator seams used by the rollout controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::BoxStream;
use serde::Serialize;

use crate::core::state::runtime::workload::workload_snapshot::WorkloadSpec;

pub const TRIGGERED_AT_ANNOTATION: &str = "argoos.io/triggered-at";
pub const TRIGGERED_BY_ANNOTATION: &str = "argoos.io/triggered-by";

/// Change notification coming from the cluster watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadEvent {
    /// Workload created or modified
    Applied(WorkloadSpec),
    /// Workload removed, by id
    Deleted(String),
    /// The watch (re)listed everything; this is the complete set
    Restarted(Vec<WorkloadSpec>),
}

/// Pod-template change that makes the cluster roll a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutPatch {
    pub triggered_at: DateTime<Utc>,
    /// Pushed image that caused the rollout
    pub triggered_by: String,
}

impl RolloutPatch {
    pub fn new(triggered_by: impl Into<String>) -> Self {
        Self {
            triggered_at: Utc::now(),
            triggered_by: triggered_by.into(),
        }
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                TRIGGERED_AT_ANNOTATION.to_string(),
                self.triggered_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (TRIGGERED_BY_ANNOTATION.to_string(), self.triggered_by.clone()),
        ])
    }

    /// Merge-patch body for a Deployment.
    pub fn to_merge_patch(&self) -> serde_json::Value {
        serde_json::json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": self.annotations()
                    }
                }
            }
        })
    }
}

/// An established connection to the cluster API.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Full listing of every workload.
    async fn list_workloads(&self) -> Result<Vec<WorkloadSpec>>;

    /// Apply a rollout patch to one workload.
    async fn patch_workload(&self, workload: &WorkloadSpec, patch: &RolloutPatch) -> Result<()>;

    /// Long-lived change stream. Reconnects internally; errors are reported, not terminal.
    fn watch_workloads(&self) -> BoxStream<'static, Result<WorkloadEvent>>;
}

/// Opens `ClusterClient`s.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ClusterClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_patch_targets_the_pod_template() {
        let patch = RolloutPatch::new("registry:5000/app:v2");
        let body = patch.to_merge_patch();

        let annotations = &body["spec"]["template"]["metadata"]["annotations"];
        assert_eq!(annotations[TRIGGERED_BY_ANNOTATION], "registry:5000/app:v2");
        assert!(annotations[TRIGGERED_AT_ANNOTATION]
            .as_str()
            .unwrap()
            .ends_with('Z'));
    }
}
