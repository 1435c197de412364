use std::sync::Arc;

use aya::maps::{HashMap, MapData};
use srv6_mesh_ebpf_common::{PolicyKey, PolicyValue, SidKey, SidValue, VrfKey, VrfValue};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AgentArgs;
use crate::identity::{IdentityAllocator, LabelIdentityAllocator};
use crate::ipam::PrefixAllocator;
use crate::manager::allocator::SidManager;
use crate::manager::signaler::BgpSignaler;
use crate::manager::{ManagerConfig, Srv6Manager, reconciler};
use crate::{Result, bpf, http, kubernetes};

/// Wire the agent together: pinned datapath maps, the manager and its
/// reconciler, the watch layer and the http listener, then wait for shutdown.
pub async fn start(
    args: AgentArgs,
    sid_manager_rx: oneshot::Receiver<Arc<dyn SidManager>>,
    signaler: Arc<dyn BgpSignaler>,
    cancel: CancellationToken,
) -> Result<()> {
    let client = kube::Client::try_default().await?;

    let vrf_map: HashMap<MapData, VrfKey, VrfValue> =
        bpf::open_pinned_map(&args.bpf_fs, bpf::VRF_MAP_PIN)?;
    let policy_map: HashMap<MapData, PolicyKey, PolicyValue> =
        bpf::open_pinned_map(&args.bpf_fs, bpf::POLICY_MAP_PIN)?;
    let sid_map: HashMap<MapData, SidKey, SidValue> =
        bpf::open_pinned_map(&args.bpf_fs, bpf::SID_MAP_PIN)?;

    let manager = Srv6Manager::new(
        ManagerConfig {
            enable_srv6: args.enable_srv6,
        },
        vrf_map,
        policy_map,
        sid_map,
        signaler,
    );

    let ready = CancellationToken::new();
    let identity: Arc<dyn IdentityAllocator> = Arc::new(LabelIdentityAllocator);
    kubernetes::start(
        client,
        manager.clone(),
        identity,
        ready.clone(),
        cancel.child_token(),
    )
    .await?;

    manager.set_sid_allocator(Arc::new(PrefixAllocator::new(args.sid_prefix)));

    // The SID manager resolves once; subscribing is the side effect of
    // resolution. Without one, locator pools stay dormant and every exported
    // VRF is served by the default allocator.
    let resolved = manager.clone();
    tokio::spawn(async move {
        match sid_manager_rx.await {
            Ok(sid_manager) => resolved.on_sid_manager(sid_manager),
            Err(_) => info!("no SID manager available, locator pools disabled"),
        }
    });

    tokio::spawn(reconciler::run(manager, cancel.child_token()));
    tokio::spawn(http::serve(
        args.metrics_address,
        ready,
        cancel.child_token(),
    ));

    info!(node = %args.node_name, "srv6 egress agent started");
    cancel.cancelled().await;
    Ok(())
}
