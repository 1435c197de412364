use std::fmt::Debug;
use std::hash::Hash;
use std::net::Ipv6Addr;

use srv6_mesh_common::{AddressFamily, Behavior, BehaviorType, Sid, SidInfo, VrfId};
use srv6_mesh_ebpf_common::{PolicyKey, PolicyValue, SidKey, SidValue, VrfKey, VrfValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bpf::BpfMap;
use crate::manager::allocator::{allocate_from_pool, release_to_pool};
use crate::manager::signaler::BgpSignaler;
use crate::manager::{
    OWNER_NAME, SidSource, Srv6Manager, State, VpnAdvertisement, endpoint,
};
use crate::{Error, metrics};

/// The reconciliation task. Level-triggered: each wake runs one pass that
/// rebuilds desired state from the stores; a wake during a pass leaves a
/// permit behind, so no update is ever missed. The first pass is held until
/// the caches are synced and the default SID allocator is installed.
///
/// On cancellation the task exits without releasing SIDs or clearing maps;
/// restoration picks the state up on the next startup.
pub async fn run<V, P, S>(manager: Srv6Manager<V, P, S>, cancel: CancellationToken)
where
    V: BpfMap<VrfKey, VrfValue> + Send + 'static,
    P: BpfMap<PolicyKey, PolicyValue> + Send + 'static,
    S: BpfMap<SidKey, SidValue> + Send + 'static,
{
    info!("srv6 reconciler started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("srv6 reconciler stopped");
                return;
            }
            _ = manager.shared.wake.notified() => {}
        }
        if !manager.is_initialized() {
            debug!("waiting for cache sync and default SID allocator");
            continue;
        }
        manager.reconcile_pass();
    }
}

impl<V, P, S> Srv6Manager<V, P, S>
where
    V: BpfMap<VrfKey, VrfValue>,
    P: BpfMap<PolicyKey, PolicyValue>,
    S: BpfMap<SidKey, SidValue>,
{
    /// One reconciliation pass: reconcile SIDs, rebuild the desired contents
    /// of all three maps from the stores and apply the per-key diff.
    pub(crate) fn reconcile_pass(&self) {
        if !self.shared.enabled {
            return;
        }
        if !self.is_initialized() {
            return;
        }
        metrics::RECONCILER.runs.inc();

        let mut state = self.lock();
        state.drain_pending_releases();
        state.reconcile_sids();

        let desired = state.desired_vrf_entries();
        apply_map_diff(&mut state.vrf_map, desired, "vrf");
        let desired = state.desired_policy_entries();
        apply_map_diff(&mut state.policy_map, desired, "policy");
        let desired = state.desired_sid_entries();
        apply_map_diff(&mut state.sid_map, desired, "sid");

        state.kick_signaler(self.shared.signaler.as_ref());
    }
}

impl<V, P, S> State<V, P, S> {
    /// SIDs parked by VRF deletion are released here, in the reconciler,
    /// rather than in the watch callbacks.
    pub(crate) fn drain_pending_releases(&mut self) {
        let pending = std::mem::take(&mut self.pending_releases);
        for (info, source) in pending {
            self.release_sid(&info, &source);
        }
    }

    /// Ensure every VRF holds exactly the SID its spec asks for: none without
    /// an export route target, one from the referenced locator pool, or one
    /// from the default allocator otherwise.
    pub(crate) fn reconcile_sids(&mut self) {
        let Some(default_allocator) = self.default_allocator.clone() else {
            return;
        };
        let sid_manager = self.sid_manager.clone();
        let mut releases = Vec::new();

        for (name, entry) in self.vrfs.iter_mut() {
            let desired = match (
                &entry.config.export_route_target,
                &entry.config.locator_pool_ref,
            ) {
                (None, _) => None,
                (Some(_), None) => Some(SidSource::Default),
                (Some(_), Some(pool)) => Some(SidSource::Pool(pool.clone())),
            };

            let mut stale = entry.sid_info.is_some() && entry.sid_source != desired;
            if !stale
                && let (Some(info), Some(SidSource::Pool(pool))) =
                    (&entry.sid_info, &entry.sid_source)
                && let Some(allocator) = self.pools.get(pool)
                && allocator.behavior_type() != info.behavior_type
            {
                stale = true;
            }
            if stale {
                let info = entry.sid_info.take();
                let source = entry.sid_source.take();
                if let (Some(info), Some(source)) = (info, source) {
                    releases.push((info, source));
                }
            }

            if entry.sid_info.is_some() {
                continue;
            }
            let Some(desired) = desired else {
                continue;
            };
            match &desired {
                SidSource::Default => match default_allocator.allocate_next(name) {
                    Ok(addr) => {
                        debug!(vrf = %name, sid = %addr, "allocated SID from default allocator");
                        entry.sid_info = Some(SidInfo {
                            owner: OWNER_NAME.to_string(),
                            metadata: name.clone(),
                            sid: Sid::unstructured(addr),
                            behavior_type: BehaviorType::Base,
                            behavior: Behavior::from_type(BehaviorType::Base, AddressFamily::V4),
                        });
                        entry.sid_source = Some(SidSource::Default);
                    }
                    Err(e) => warn!(%e, vrf = %name, "SID allocation failed, retrying next pass"),
                },
                SidSource::Pool(pool) => {
                    if !self.pools.contains_key(pool) {
                        let e = Error::PoolMissing(pool.clone());
                        debug!(%e, vrf = %name, "VRF stays unresolved until the pool appears");
                        continue;
                    }
                    let Some(manager) = sid_manager.as_ref() else {
                        continue;
                    };
                    match allocate_from_pool(manager.as_ref(), pool, name) {
                        Ok(info) => {
                            debug!(vrf = %name, sid = %info.sid, pool = %pool, "allocated SID from locator pool");
                            entry.sid_info = Some(info);
                            entry.sid_source = Some(SidSource::Pool(pool.clone()));
                        }
                        Err(e) => {
                            warn!(%e, vrf = %name, pool = %pool, "SID allocation failed, retrying next pass")
                        }
                    }
                }
            }
        }

        for (info, source) in releases {
            self.release_sid(&info, &source);
        }
    }

    /// Release through the allocator that produced the SID. Best-effort: a
    /// pool that disappeared in the meantime only gets a warning.
    pub(crate) fn release_sid(&self, info: &SidInfo, source: &SidSource) {
        match source {
            SidSource::Default => {
                if let Some(allocator) = &self.default_allocator
                    && let Err(e) = allocator.release(info.sid.addr())
                {
                    warn!(%e, sid = %info.sid, "failed to release SID to default allocator");
                }
            }
            SidSource::Pool(pool) => {
                let Some(manager) = &self.sid_manager else {
                    warn!(sid = %info.sid, pool = %pool, "no SID manager, leaking SID release");
                    return;
                };
                if let Err(e) = release_to_pool(manager.as_ref(), pool, info.sid.addr()) {
                    warn!(%e, sid = %info.sid, pool = %pool, "failed to release SID to pool");
                }
            }
        }
    }

    /// Join VRF rules with the endpoint index: every matched endpoint IP and
    /// destination CIDR pair classifies into the rule's VRF. Overlapping keys
    /// across VRFs resolve to the first VRF in name order.
    pub(crate) fn desired_vrf_entries(&self) -> ahash::HashMap<VrfKey, VrfValue> {
        let mut desired = ahash::HashMap::default();
        for entry in self.vrfs.values() {
            for rule in &entry.config.rules {
                let ips = endpoint::ips_matching(self.endpoints.values(), &rule.selectors);
                for ip in &ips {
                    for cidr in &rule.dst_cidrs {
                        let key = VrfKey::new(*ip, cidr.network(), cidr.prefix_len());
                        desired.entry(key).or_insert(VrfValue {
                            vrf_id: entry.config.vrf_id,
                        });
                    }
                }
            }
        }
        desired
    }

    pub(crate) fn desired_policy_entries(&self) -> ahash::HashMap<PolicyKey, PolicyValue> {
        let mut desired = ahash::HashMap::default();
        for policy in self.policies.values() {
            for cidr in &policy.dst_cidrs {
                let key = PolicyKey::new(policy.vrf_id, cidr.network(), cidr.prefix_len());
                desired
                    .entry(key)
                    .or_insert(PolicyValue::new(policy.dst_sid));
            }
        }
        desired
    }

    /// Union of VRF-bound SIDs and policy destination SIDs. Duplicates must
    /// agree on the VRF id; a conflicting later entry is dropped.
    pub(crate) fn desired_sid_entries(&self) -> ahash::HashMap<SidKey, SidValue> {
        let mut desired = ahash::HashMap::default();
        for entry in self.vrfs.values() {
            if let Some(info) = &entry.sid_info {
                insert_sid_binding(&mut desired, info.sid.addr(), entry.config.vrf_id);
            }
        }
        for policy in self.policies.values() {
            insert_sid_binding(&mut desired, policy.dst_sid, policy.vrf_id);
        }
        desired
    }

    /// Emit at most one signal per pass when the VPN-relevant projection of
    /// the VRF store changed since the last emission.
    pub(crate) fn kick_signaler(&mut self, signaler: &dyn BgpSignaler) {
        let current: std::collections::BTreeMap<String, VpnAdvertisement> = self
            .vrfs
            .iter()
            .filter_map(|(name, entry)| {
                entry.config.export_route_target.clone().map(|route_target| {
                    (
                        name.clone(),
                        VpnAdvertisement {
                            vrf_id: entry.config.vrf_id,
                            route_target,
                            sid: entry.sid_info.as_ref().map(|info| info.sid.addr()),
                            rules_fingerprint: entry.config.rules_fingerprint,
                        },
                    )
                })
            })
            .collect();
        if current != self.last_vpn_state {
            debug!("VPN-relevant state changed, kicking BGP signaler");
            signaler.event();
            metrics::RECONCILER.signaler_events.inc();
            self.last_vpn_state = current;
        }
    }
}

fn insert_sid_binding(
    desired: &mut ahash::HashMap<SidKey, SidValue>,
    sid: Ipv6Addr,
    vrf_id: VrfId,
) {
    use std::collections::hash_map::Entry;

    match desired.entry(SidKey::new(sid)) {
        Entry::Vacant(entry) => {
            entry.insert(SidValue { vrf_id });
        }
        Entry::Occupied(entry) => {
            if entry.get().vrf_id != vrf_id {
                let e = Error::SidConflict(sid);
                warn!(%e, kept = entry.get().vrf_id, dropped = vrf_id, "keeping first binding");
            }
        }
    }
}

/// Bring one map to the desired contents with per-key operations: delete
/// keys that should not exist, upsert keys whose value is absent or differs.
/// A failing entry is skipped and retried on the next pass; the map is never
/// cleared wholesale.
fn apply_map_diff<M, K, Val>(map: &mut M, desired: ahash::HashMap<K, Val>, name: &str)
where
    M: BpfMap<K, Val>,
    K: Eq + Hash + Clone + Debug,
    Val: PartialEq,
{
    let current = match map.get_state() {
        Ok(current) => current,
        Err(e) => {
            metrics::RECONCILER.map_write_failures.inc();
            error!(%e, map = name, "failed to read map state");
            return;
        }
    };
    for key in current.keys() {
        if desired.contains_key(key) {
            continue;
        }
        if let Err(e) = map.delete(key) {
            metrics::RECONCILER.map_write_failures.inc();
            error!(%e, map = name, ?key, "failed to delete stale entry");
        }
    }
    for (key, value) in desired {
        if current.get(&key) == Some(&value) {
            continue;
        }
        if let Err(e) = map.update(key.clone(), value) {
            metrics::RECONCILER.map_write_failures.inc();
            error!(%e, map = name, ?key, "failed to update entry");
        }
    }
}
