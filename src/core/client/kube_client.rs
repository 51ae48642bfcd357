use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::config::ClusterSettings;
use crate::core::client::cluster::{ClusterClient, ClusterConnector, RolloutPatch, WorkloadEvent};
use crate::core::client::deployments::{fetch_deployments, patch_deployment_rollout};
use crate::core::client::mappers::map_deployment_to_workload_spec;
use crate::core::client::watchers::watch_deployments;
use crate::core::state::runtime::workload::workload_snapshot::WorkloadSpec;

/// Creates a Kubernetes client from the resolved cluster settings.
///
/// - in-cluster: service account token and CA mounted in the pod
/// - explicit master URL: certificates and TLS options from settings
/// - otherwise: local kubeconfig / inferred configuration
pub async fn build_kube_client(settings: &ClusterSettings) -> Result<Client> {
    let mut config = if settings.in_cluster {
        debug!("Using in-cluster configuration");
        Config::incluster().context("failed to load in-cluster configuration")?
    } else if let Some(master) = settings.master_url.as_deref() {
        debug!("Using explicit API server {}", master);
        let kubeconfig = explicit_kubeconfig(settings, master)?;
        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("failed to build configuration for the API server")?
    } else {
        debug!("Using inferred configuration (kubeconfig or environment)");
        Config::infer()
            .await
            .context("failed to infer kubernetes configuration")?
    };

    if settings.skip_ssl_verification {
        config.accept_invalid_certs = true;
    }

    let client = Client::try_from(config).context("failed to create kube client")?;

    debug!("Kubernetes client initialized successfully");
    Ok(client)
}

/// In-memory kubeconfig for an explicitly addressed API server.
fn explicit_kubeconfig(settings: &ClusterSettings, master: &str) -> Result<Kubeconfig> {
    let path = |p: &Option<std::path::PathBuf>| p.as_ref().map(|p| p.display().to_string());

    let raw = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": "argoos",
            "cluster": {
                "server": master,
                "certificate-authority": path(&settings.ca_file),
                "insecure-skip-tls-verify": settings.skip_ssl_verification,
            }
        }],
        "users": [{
            "name": "argoos",
            "user": {
                "client-certificate": path(&settings.cert_file),
                "client-key": path(&settings.key_file),
            }
        }],
        "contexts": [{
            "name": "argoos",
            "context": { "cluster": "argoos", "user": "argoos" }
        }],
        "current-context": "argoos",
    });

    serde_json::from_value(raw).context("invalid cluster settings")
}

/// Opens kube-rs backed cluster clients.
pub struct KubeConnector {
    settings: ClusterSettings,
}

impl KubeConnector {
    pub fn new(settings: ClusterSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self) -> Result<Arc<dyn ClusterClient>> {
        let client = build_kube_client(&self.settings).await?;

        // cheap round trip so a bad endpoint fails at startup, not on first push
        let version = client
            .apiserver_version()
            .await
            .context("kubernetes API server is unreachable")?;
        info!("Connected to Kubernetes {}.{}", version.major, version.minor);

        Ok(Arc::new(KubeClusterClient { client }))
    }
}

pub struct KubeClusterClient {
    client: Client,
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_workloads(&self) -> Result<Vec<WorkloadSpec>> {
        let deployments = fetch_deployments(&self.client).await?;
        Ok(deployments
            .iter()
            .filter_map(map_deployment_to_workload_spec)
            .collect())
    }

    async fn patch_workload(&self, workload: &WorkloadSpec, patch: &RolloutPatch) -> Result<()> {
        patch_deployment_rollout(&self.client, &workload.namespace, &workload.name, patch).await
    }

    fn watch_workloads(&self) -> BoxStream<'static, Result<WorkloadEvent>> {
        watch_deployments(&self.client)
    }
}
