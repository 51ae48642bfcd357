// Cluster-facing seam used by the rollout controller
pub mod cluster;

// Kube-rs based Kubernetes client
pub mod kube_client;
pub mod kube_resources;
pub mod deployments;
pub mod watchers;
pub mod mappers;

#[cfg(test)]
pub mod fake;
