pub mod allocator;
pub mod endpoint;
pub mod parser;
pub mod reconciler;
pub mod sidmanager;
pub mod signaler;

#[cfg(test)]
pub(crate) mod testutils;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use ipnet::Ipv4Net;
use kube::core::Selector;
use srv6_mesh_common::{RouteTarget, SidInfo, VrfId};
use tokio::sync::Notify;
use tracing::debug;

use crate::manager::allocator::{IpamAllocator, SidAllocator, SidManager, SidManagerSubscriber};
use crate::manager::endpoint::{Endpoint, EndpointId};
use crate::manager::signaler::BgpSignaler;

/// Name this manager identifies itself with towards the SID manager.
pub const OWNER_NAME: &str = "srv6-manager";

/// A routing domain as accepted from the cluster, after validation.
#[derive(Clone, Debug)]
pub struct Vrf {
    pub name: String,
    pub vrf_id: VrfId,
    pub export_route_target: Option<RouteTarget>,
    pub locator_pool_ref: Option<String>,
    pub rules: Vec<VrfRule>,
    /// Stable digest of the raw rule spec, used to detect rule changes for
    /// BGP signaling without comparing parsed selectors.
    pub rules_fingerprint: u64,
}

#[derive(Clone, Debug)]
pub struct VrfRule {
    pub selectors: Vec<Selector>,
    pub dst_cidrs: Vec<Ipv4Net>,
}

/// An explicit VRF-scoped egress route.
#[derive(Clone, Debug)]
pub struct EgressPolicy {
    pub name: String,
    pub vrf_id: VrfId,
    pub dst_cidrs: Vec<Ipv4Net>,
    pub dst_sid: Ipv6Addr,
}

/// Which allocator produced a VRF's bound SID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SidSource {
    Default,
    Pool(String),
}

pub(crate) struct VrfEntry {
    pub(crate) config: Vrf,
    pub(crate) sid_info: Option<SidInfo>,
    pub(crate) sid_source: Option<SidSource>,
}

/// Diagnostic snapshot of one VRF, including its bound SID.
#[derive(Clone, Debug)]
pub struct VrfSnapshot {
    pub vrf: Vrf,
    pub sid_info: Option<SidInfo>,
}

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub enable_srv6: bool,
}

/// VPN-relevant projection of one VRF, kept from the last signaled pass.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct VpnAdvertisement {
    pub(crate) vrf_id: VrfId,
    pub(crate) route_target: RouteTarget,
    pub(crate) sid: Option<Ipv6Addr>,
    pub(crate) rules_fingerprint: u64,
}

pub(crate) struct Shared<V, P, S> {
    pub(crate) state: Mutex<State<V, P, S>>,
    pub(crate) wake: Notify,
    pub(crate) enabled: bool,
    pub(crate) signaler: Arc<dyn BgpSignaler>,
}

pub(crate) struct State<V, P, S> {
    pub(crate) endpoints: ahash::HashMap<EndpointId, Endpoint>,
    pub(crate) vrfs: BTreeMap<String, VrfEntry>,
    pub(crate) policies: BTreeMap<String, EgressPolicy>,
    pub(crate) pools: ahash::HashMap<String, Arc<dyn SidAllocator>>,
    pub(crate) default_allocator: Option<Arc<dyn IpamAllocator>>,
    pub(crate) sid_manager: Option<Arc<dyn SidManager>>,
    pub(crate) pending_releases: Vec<(SidInfo, SidSource)>,
    pub(crate) synced: bool,
    pub(crate) last_vpn_state: BTreeMap<String, VpnAdvertisement>,
    pub(crate) vrf_map: V,
    pub(crate) policy_map: P,
    pub(crate) sid_map: S,
}

/// The SRv6 egress manager: joins endpoint, VRF and policy inputs into the
/// three datapath maps and owns SID lifecycle for exported VRFs.
///
/// Callbacks mutate the stores under the state mutex and wake the reconciler;
/// only the reconciliation pass writes to the maps.
pub struct Srv6Manager<V, P, S> {
    pub(crate) shared: Arc<Shared<V, P, S>>,
}

impl<V, P, S> Clone for Srv6Manager<V, P, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, P, S> Srv6Manager<V, P, S> {
    pub fn new(
        config: ManagerConfig,
        vrf_map: V,
        policy_map: P,
        sid_map: S,
        signaler: Arc<dyn BgpSignaler>,
    ) -> Self {
        let state = State {
            endpoints: ahash::HashMap::default(),
            vrfs: BTreeMap::new(),
            policies: BTreeMap::new(),
            pools: ahash::HashMap::default(),
            default_allocator: None,
            sid_manager: None,
            pending_releases: Vec::new(),
            synced: false,
            last_vpn_state: BTreeMap::new(),
            vrf_map,
            policy_map,
            sid_map,
        };
        let shared = Shared {
            state: Mutex::new(state),
            wake: Notify::new(),
            enabled: config.enable_srv6,
            signaler,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State<V, P, S>> {
        self.shared.state.lock().unwrap()
    }

    pub(crate) fn wake(&self) {
        self.shared.wake.notify_one();
    }

    pub fn on_update_endpoint(&self, endpoint: Endpoint) {
        let mut state = self.lock();
        if endpoint.identity.is_none() {
            debug!(endpoint = %endpoint.id, "endpoint identity unresolved, holding inactive");
        }
        state.endpoints.insert(endpoint.id.clone(), endpoint);
        drop(state);
        self.wake();
    }

    pub fn on_delete_endpoint(&self, id: &EndpointId) {
        let mut state = self.lock();
        state.endpoints.remove(id);
        drop(state);
        self.wake();
    }

    pub fn on_add_srv6_vrf(&self, vrf: Vrf) {
        let mut state = self.lock();
        match state.vrfs.entry(vrf.name.clone()) {
            Entry::Occupied(mut entry) => {
                // keep the bound SID; the next pass releases it if the new
                // spec made it stale
                entry.get_mut().config = vrf;
            }
            Entry::Vacant(entry) => {
                entry.insert(VrfEntry {
                    config: vrf,
                    sid_info: None,
                    sid_source: None,
                });
            }
        }
        drop(state);
        self.wake();
    }

    pub fn on_delete_srv6_vrf(&self, name: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.vrfs.remove(name)
            && let (Some(info), Some(source)) = (entry.sid_info, entry.sid_source)
        {
            state.pending_releases.push((info, source));
        }
        drop(state);
        self.wake();
    }

    pub fn on_add_srv6_policy(&self, policy: EgressPolicy) {
        let mut state = self.lock();
        state.policies.insert(policy.name.clone(), policy);
        drop(state);
        self.wake();
    }

    pub fn on_delete_srv6_policy(&self, name: &str) {
        let mut state = self.lock();
        state.policies.remove(name);
        drop(state);
        self.wake();
    }

    /// Install the default SID allocator. This is a late-binding step; the
    /// reconciler holds its first pass until it happened.
    pub fn set_sid_allocator(&self, allocator: Arc<dyn IpamAllocator>) {
        let mut state = self.lock();
        state.default_allocator = Some(allocator);
        drop(state);
        self.wake();
    }

    /// One-shot latch fired by the input collator once all initial caches
    /// are synced.
    pub fn set_synced(&self) {
        let mut state = self.lock();
        state.synced = true;
        drop(state);
        self.wake();
    }

    pub fn sid_allocator_is_set(&self) -> bool {
        self.lock().default_allocator.is_some()
    }

    pub(crate) fn is_initialized(&self) -> bool {
        let state = self.lock();
        state.synced && state.default_allocator.is_some()
    }

    /// Stable snapshot of all VRF records for diagnostics.
    pub fn get_all_vrfs(&self) -> Vec<VrfSnapshot> {
        let state = self.lock();
        state
            .vrfs
            .values()
            .map(|entry| VrfSnapshot {
                vrf: entry.config.clone(),
                sid_info: entry.sid_info.clone(),
            })
            .collect()
    }
}

impl<V, P, S> Srv6Manager<V, P, S>
where
    V: Send + 'static,
    P: Send + 'static,
    S: Send + 'static,
{
    /// Called when the SID manager promise resolves. Subscribing is the side
    /// effect of resolution; the subscription delivers the locator callbacks
    /// and the initial restoration scan.
    pub fn on_sid_manager(&self, manager: Arc<dyn SidManager>) {
        {
            let mut state = self.lock();
            state.sid_manager = Some(manager.clone());
        }
        let subscriber: Arc<dyn SidManagerSubscriber> = Arc::new(self.clone());
        manager.subscribe(
            OWNER_NAME,
            subscriber,
            Box::new(|| {
                debug!("SID manager subscription complete");
            }),
        );
        self.wake();
    }
}
