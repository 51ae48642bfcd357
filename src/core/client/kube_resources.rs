/// Re-export the Kubernetes resource types the rollout path works with
pub use k8s_openapi::api::apps::v1::Deployment;

pub use k8s_openapi::api::core::v1::PodSpec;
