use anyhow::{Context, Result};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use tracing::debug;

use crate::core::client::cluster::RolloutPatch;
use crate::core::client::kube_resources::Deployment;

pub const FIELD_MANAGER: &str = "argoos";

/// Fetch all deployments in the cluster
pub async fn fetch_deployments(client: &Client) -> Result<Vec<Deployment>> {
    let deployments: Api<Deployment> = Api::all(client.clone());
    let deployment_list = deployments
        .list(&ListParams::default())
        .await
        .context("failed to list deployments")?;

    debug!("Discovered {} deployment(s)", deployment_list.items.len());
    Ok(deployment_list.items)
}

/// Stamp the pod template of one deployment so the cluster rolls it.
pub async fn patch_deployment_rollout(
    client: &Client,
    namespace: &str,
    deployment_name: &str,
    patch: &RolloutPatch,
) -> Result<()> {
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let params = PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    };

    deployments
        .patch(deployment_name, &params, &Patch::Merge(&patch.to_merge_patch()))
        .await
        .with_context(|| format!("failed to patch deployment {}/{}", namespace, deployment_name))?;

    debug!(
        "Patched deployment {}/{} (triggered by {})",
        namespace, deployment_name, patch.triggered_by
    );
    Ok(())
}
