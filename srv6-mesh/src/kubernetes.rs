use std::net::{IpAddr, Ipv4Addr};
use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, ResourceExt};
use srv6_mesh_crds::v1alpha1::srv6egresspolicy::SRv6EgressPolicy;
use srv6_mesh_crds::v1alpha1::srv6vrf::SRv6VRF;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Result;
use crate::identity::IdentityAllocator;
use crate::manager::endpoint::{Endpoint, EndpointId};
use crate::manager::{Srv6Manager, parser};

/// Number of watch streams that contribute to the initial cache sync.
const SYNC_SOURCES: usize = 3;

/// Start the watch loops feeding the manager and the collator that trips the
/// cache-sync latch once every stream finished its initial list.
pub async fn start<V, P, S>(
    client: kube::Client,
    manager: Srv6Manager<V, P, S>,
    identity: Arc<dyn IdentityAllocator>,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()>
where
    V: Send + 'static,
    P: Send + 'static,
    S: Send + 'static,
{
    let (sync_tx, sync_rx) = tokio::sync::mpsc::channel(SYNC_SOURCES);

    tokio::spawn(watch_vrfs(
        client.clone(),
        manager.clone(),
        sync_tx.clone(),
        cancel.child_token(),
    ));
    tokio::spawn(watch_policies(
        client.clone(),
        manager.clone(),
        sync_tx.clone(),
        cancel.child_token(),
    ));
    tokio::spawn(watch_pods(
        client,
        manager.clone(),
        identity,
        sync_tx,
        cancel.child_token(),
    ));
    tokio::spawn(collate_sync(manager, sync_rx, ready));

    Ok(())
}

async fn collate_sync<V, P, S>(
    manager: Srv6Manager<V, P, S>,
    mut sync_rx: Receiver<()>,
    ready: CancellationToken,
) {
    for _ in 0..SYNC_SOURCES {
        if sync_rx.recv().await.is_none() {
            return;
        }
    }
    info!("initial cache sync complete");
    manager.set_synced();
    ready.cancel();
}

async fn watch_vrfs<V, P, S>(
    client: kube::Client,
    manager: Srv6Manager<V, P, S>,
    sync_tx: Sender<()>,
    cancel: CancellationToken,
) {
    let api: Api<SRv6VRF> = Api::all(client);
    let mut stream = pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut synced = false;

    info!("started SRv6VRF watch");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = stream.next() => event,
        };
        let Some(event) = event else {
            return;
        };
        match event {
            Ok(watcher::Event::Init) => {}
            Ok(watcher::Event::InitApply(vrf)) | Ok(watcher::Event::Apply(vrf)) => {
                match parser::parse_vrf(&vrf) {
                    Ok(parsed) => manager.on_add_srv6_vrf(parsed),
                    Err(e) => warn!(%e, vrf = %vrf.name_any(), "dropping invalid SRv6VRF"),
                }
            }
            Ok(watcher::Event::Delete(vrf)) => manager.on_delete_srv6_vrf(&vrf.name_any()),
            Ok(watcher::Event::InitDone) => {
                if !synced {
                    synced = true;
                    let _ = sync_tx.send(()).await;
                }
            }
            Err(e) => error!(%e, "unexpected error with SRv6VRF watch stream"),
        }
    }
}

async fn watch_policies<V, P, S>(
    client: kube::Client,
    manager: Srv6Manager<V, P, S>,
    sync_tx: Sender<()>,
    cancel: CancellationToken,
) {
    let api: Api<SRv6EgressPolicy> = Api::all(client);
    let mut stream = pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut synced = false;

    info!("started SRv6EgressPolicy watch");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = stream.next() => event,
        };
        let Some(event) = event else {
            return;
        };
        match event {
            Ok(watcher::Event::Init) => {}
            Ok(watcher::Event::InitApply(policy)) | Ok(watcher::Event::Apply(policy)) => {
                match parser::parse_policy(&policy) {
                    Ok(parsed) => manager.on_add_srv6_policy(parsed),
                    Err(e) => {
                        warn!(%e, policy = %policy.name_any(), "dropping invalid SRv6EgressPolicy")
                    }
                }
            }
            Ok(watcher::Event::Delete(policy)) => {
                manager.on_delete_srv6_policy(&policy.name_any())
            }
            Ok(watcher::Event::InitDone) => {
                if !synced {
                    synced = true;
                    let _ = sync_tx.send(()).await;
                }
            }
            Err(e) => error!(%e, "unexpected error with SRv6EgressPolicy watch stream"),
        }
    }
}

async fn watch_pods<V, P, S>(
    client: kube::Client,
    manager: Srv6Manager<V, P, S>,
    identity: Arc<dyn IdentityAllocator>,
    sync_tx: Sender<()>,
    cancel: CancellationToken,
) {
    let api: Api<Pod> = Api::all(client);
    let mut stream = pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut synced = false;

    info!("started pod watch");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = stream.next() => event,
        };
        let Some(event) = event else {
            return;
        };
        match event {
            Ok(watcher::Event::Init) => {}
            Ok(watcher::Event::InitApply(pod)) | Ok(watcher::Event::Apply(pod)) => {
                if let Some(endpoint) = endpoint_from_pod(&pod, identity.as_ref()) {
                    manager.on_update_endpoint(endpoint);
                }
            }
            Ok(watcher::Event::Delete(pod)) => {
                manager.on_delete_endpoint(&endpoint_id(&pod));
            }
            Ok(watcher::Event::InitDone) => {
                if !synced {
                    synced = true;
                    let _ = sync_tx.send(()).await;
                }
            }
            Err(e) => error!(%e, "unexpected error with pod watch stream"),
        }
    }
}

fn endpoint_id(pod: &Pod) -> EndpointId {
    EndpointId {
        namespace: pod.namespace().unwrap_or_default(),
        name: pod.name_any(),
    }
}

fn endpoint_from_pod(pod: &Pod, identity: &dyn IdentityAllocator) -> Option<Endpoint> {
    if pod_is_host_network(pod) {
        return None;
    }
    let labels = pod.labels().to_owned();
    let identity = match identity.resolve(&labels) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(%e, pod = %pod.name_any(), "identity resolution pending");
            None
        }
    };
    Some(Endpoint {
        id: endpoint_id(pod),
        labels,
        ips: pod_ipv4s(pod),
        identity,
    })
}

fn pod_ipv4s(pod: &Pod) -> Vec<Ipv4Addr> {
    let Some(status) = pod.status.as_ref() else {
        return vec![];
    };
    let Some(ips) = status.pod_ips.as_ref() else {
        return vec![];
    };
    ips.iter()
        .filter_map(|ip| match ip.ip.parse() {
            Ok(IpAddr::V4(addr)) => Some(addr),
            _ => None,
        })
        .collect()
}

fn pod_is_host_network(pod: &Pod) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return false;
    };
    spec.host_network.unwrap_or_default()
}
