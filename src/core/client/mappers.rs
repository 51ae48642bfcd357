/// Maps kube-rs / k8s-openapi types → internal domain models
use std::collections::BTreeSet;

use crate::core::client::kube_resources::{Deployment, PodSpec};
use crate::core::state::runtime::workload::workload_snapshot::{workload_id, WorkloadSpec};

/// Converts a Deployment into a WorkloadSpec.
///
/// Returns `None` for objects without a name (never the case for objects served
/// by the API server, but the openapi types keep it optional).
pub fn map_deployment_to_workload_spec(deployment: &Deployment) -> Option<WorkloadSpec> {
    let metadata = &deployment.metadata;
    let name = metadata.name.as_deref()?;
    let namespace = metadata.namespace.as_deref().unwrap_or("default");

    let image_references = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(pod_spec_images)
        .unwrap_or_default();

    Some(WorkloadSpec {
        id: workload_id(namespace, name),
        namespace: namespace.to_string(),
        name: name.to_string(),
        image_references,
        current_revision: metadata.resource_version.clone().unwrap_or_default(),
    })
}

/// Id of a Deployment, if it has a name.
pub fn deployment_workload_id(deployment: &Deployment) -> Option<String> {
    let name = deployment.metadata.name.as_deref()?;
    let namespace = deployment.metadata.namespace.as_deref().unwrap_or("default");
    Some(workload_id(namespace, name))
}

fn pod_spec_images(spec: &PodSpec) -> BTreeSet<String> {
    let init = spec.init_containers.iter().flatten();

    spec.containers
        .iter()
        .chain(init)
        .filter_map(|c| c.image.clone())
        .filter(|image| !image.trim().is_empty())
        .collect()
}
