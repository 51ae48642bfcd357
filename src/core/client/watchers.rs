use anyhow::Result;
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use tracing::{debug, info};

use crate::core::client::cluster::WorkloadEvent;
use crate::core::client::kube_resources::Deployment;
use crate::core::client::mappers::{deployment_workload_id, map_deployment_to_workload_spec};

/// Watch for Deployment changes in real-time.
///
/// Initial (and re-)listings are buffered and emitted as one
/// `WorkloadEvent::Restarted`, so consumers never see a partial relist.
/// The underlying watcher backs off and reconnects on its own.
pub fn watch_deployments(client: &Client) -> BoxStream<'static, Result<WorkloadEvent>> {
    let api: Api<Deployment> = Api::all(client.clone());
    let watcher_config = watcher::Config::default();

    info!("Starting Deployment watcher...");

    let mut relist: Option<Vec<_>> = None;

    watcher(api, watcher_config)
        .modify(|deployment| {
            // only metadata and the pod template matter here
            deployment.metadata.managed_fields = None;
            deployment.status = None;
        })
        .default_backoff()
        .filter_map(move |event| {
            let out = match event {
                Ok(watcher::Event::Init) => {
                    relist = Some(Vec::new());
                    None
                }
                Ok(watcher::Event::InitApply(deployment)) => {
                    if let (Some(buffer), Some(spec)) =
                        (relist.as_mut(), map_deployment_to_workload_spec(&deployment))
                    {
                        buffer.push(spec);
                    }
                    None
                }
                Ok(watcher::Event::InitDone) => relist.take().map(|workloads| {
                    debug!("Deployment watcher relisted {} workload(s)", workloads.len());
                    Ok(WorkloadEvent::Restarted(workloads))
                }),
                Ok(watcher::Event::Apply(deployment)) => {
                    map_deployment_to_workload_spec(&deployment).map(|spec| {
                        debug!("Deployment event: {}", spec.id);
                        Ok(WorkloadEvent::Applied(spec))
                    })
                }
                Ok(watcher::Event::Delete(deployment)) => {
                    deployment_workload_id(&deployment).map(|id| Ok(WorkloadEvent::Deleted(id)))
                }
                Err(e) => Some(Err(anyhow::Error::new(e).context("deployment watcher error"))),
            };
            future::ready(out)
        })
        .boxed()
}
