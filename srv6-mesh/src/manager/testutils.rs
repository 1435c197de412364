use std::collections::BTreeMap;
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ipnet::Ipv4Net;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use srv6_mesh_common::{Behavior, BehaviorType, Sid, SidInfo, SidStructure};
use srv6_mesh_crds::v1alpha1::srv6egresspolicy::{SRv6EgressPolicy, SRv6EgressPolicySpec};
use srv6_mesh_crds::v1alpha1::srv6vrf::{EndpointSelector, SRv6VRF, SRv6VRFSpec, VRFRule};
use srv6_mesh_ebpf_common::{PolicyKey, SidKey, VrfKey};

use crate::bpf::BpfMap;
use crate::manager::allocator::{IpamAllocator, SidAllocator, SidManager, SidManagerSubscriber};
use crate::manager::endpoint::{Endpoint, EndpointId};
use crate::manager::signaler::BgpSignaler;
use crate::manager::{EgressPolicy, ManagerConfig, OWNER_NAME, Srv6Manager, Vrf, parser};
use crate::{Error, Result};

/// Fixed SIDs used across the manager tests.
pub(crate) const SID1: &str = "fd00:0:0:1::";
pub(crate) const SID2: &str = "fd00:0:1:1::";
pub(crate) const SID3: &str = "fd00:0:1:2::";

/// Shared in-memory stand-in for a kernel map. Counts writes so tests can
/// assert that an unchanged pass performs none.
pub(crate) struct FakeMap<K, V> {
    entries: Arc<Mutex<ahash::HashMap<K, V>>>,
    writes: Arc<AtomicUsize>,
}

impl<K, V> Clone for FakeMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            writes: Arc::clone(&self.writes),
        }
    }
}

impl<K, V> FakeMap<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(ahash::HashMap::default())),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<K: Eq + Hash + Clone, V: Clone> FakeMap<K, V> {
    pub(crate) fn state(&self) -> ahash::HashMap<K, V> {
        self.entries.lock().unwrap().clone()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> BpfMap<K, V> for FakeMap<K, V> {
    fn update(&mut self, key: K, value: V) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(key, value);
        Ok(())
    }
    fn delete(&mut self, key: &K) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
    fn get(&self, key: &K) -> Result<V> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(Error::KeyNotExist)
    }
    fn get_state(&self) -> Result<ahash::HashMap<K, V>> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

/// Always hands out one fixed SID.
pub(crate) struct FakeIpamAllocator {
    sid: Ipv6Addr,
    pub(crate) released: Mutex<Vec<Ipv6Addr>>,
}

impl FakeIpamAllocator {
    pub(crate) fn new(sid: Ipv6Addr) -> Self {
        Self {
            sid,
            released: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn released(&self) -> Vec<Ipv6Addr> {
        self.released.lock().unwrap().clone()
    }
}

impl IpamAllocator for FakeIpamAllocator {
    fn allocate_next(&self, _owner: &str) -> Result<Ipv6Addr> {
        Ok(self.sid)
    }
    fn release(&self, addr: Ipv6Addr) -> Result<()> {
        self.released.lock().unwrap().push(addr);
        Ok(())
    }
}

pub(crate) struct FakeSidAllocator {
    sid: Sid,
    behavior_type: BehaviorType,
    allocated: Vec<SidInfo>,
    pub(crate) released: Mutex<Vec<Ipv6Addr>>,
}

impl FakeSidAllocator {
    pub(crate) fn new(sid: Sid, behavior_type: BehaviorType) -> Self {
        Self::with_allocated(sid, behavior_type, Vec::new())
    }

    pub(crate) fn with_allocated(
        sid: Sid,
        behavior_type: BehaviorType,
        allocated: Vec<SidInfo>,
    ) -> Self {
        Self {
            sid,
            behavior_type,
            allocated,
            released: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn released(&self) -> Vec<Ipv6Addr> {
        self.released.lock().unwrap().clone()
    }
}

impl SidAllocator for FakeSidAllocator {
    fn behavior_type(&self) -> BehaviorType {
        self.behavior_type
    }
    fn allocate(
        &self,
        _addr: Ipv6Addr,
        owner: &str,
        metadata: &str,
        behavior: Behavior,
    ) -> Result<SidInfo> {
        Ok(SidInfo {
            owner: owner.to_string(),
            metadata: metadata.to_string(),
            sid: self.sid,
            behavior_type: self.behavior_type,
            behavior,
        })
    }
    fn allocate_next(&self, owner: &str, metadata: &str, behavior: Behavior) -> Result<SidInfo> {
        self.allocate(self.sid.addr(), owner, metadata, behavior)
    }
    fn release(&self, addr: Ipv6Addr) -> Result<()> {
        self.released.lock().unwrap().push(addr);
        Ok(())
    }
    fn allocated_sids(&self, _owner: &str) -> Vec<SidInfo> {
        self.allocated.clone()
    }
}

pub(crate) struct FakeSidManager {
    pools: Mutex<ahash::HashMap<String, Arc<dyn SidAllocator>>>,
}

impl FakeSidManager {
    pub(crate) fn new() -> Self {
        Self {
            pools: Mutex::new(ahash::HashMap::default()),
        }
    }

    pub(crate) fn insert_pool(&self, name: &str, allocator: Arc<dyn SidAllocator>) {
        self.pools
            .lock()
            .unwrap()
            .insert(name.to_string(), allocator);
    }

    pub(crate) fn remove_pool(&self, name: &str) {
        self.pools.lock().unwrap().remove(name);
    }
}

impl SidManager for FakeSidManager {
    fn manage_sid(
        &self,
        pool: &str,
        f: &mut dyn FnMut(&dyn SidAllocator) -> Result<bool>,
    ) -> Result<()> {
        let allocator = {
            let pools = self.pools.lock().unwrap();
            let Some(allocator) = pools.get(pool) else {
                return Err(Error::PoolMissing(pool.to_string()));
            };
            allocator.clone()
        };
        f(allocator.as_ref())?;
        Ok(())
    }

    fn subscribe(
        &self,
        _subscriber_name: &str,
        subscriber: Arc<dyn SidManagerSubscriber>,
        done: Box<dyn FnOnce() + Send>,
    ) {
        let pools: Vec<_> = self
            .pools
            .lock()
            .unwrap()
            .iter()
            .map(|(name, allocator)| (name.clone(), allocator.clone()))
            .collect();
        for (name, allocator) in pools {
            subscriber.on_add_locator(&name, allocator);
        }
        done();
    }
}

pub(crate) struct CountingSignaler {
    events: AtomicUsize,
}

impl CountingSignaler {
    pub(crate) fn new() -> Self {
        Self {
            events: AtomicUsize::new(0),
        }
    }

    pub(crate) fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }
}

impl BgpSignaler for CountingSignaler {
    fn event(&self) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) type TestManager = Srv6Manager<
    FakeMap<VrfKey, srv6_mesh_ebpf_common::VrfValue>,
    FakeMap<PolicyKey, srv6_mesh_ebpf_common::PolicyValue>,
    FakeMap<SidKey, srv6_mesh_ebpf_common::SidValue>,
>;

pub(crate) struct TestHarness {
    pub(crate) manager: TestManager,
    pub(crate) vrf_map: FakeMap<VrfKey, srv6_mesh_ebpf_common::VrfValue>,
    pub(crate) policy_map: FakeMap<PolicyKey, srv6_mesh_ebpf_common::PolicyValue>,
    pub(crate) sid_map: FakeMap<SidKey, srv6_mesh_ebpf_common::SidValue>,
    pub(crate) signaler: Arc<CountingSignaler>,
    pub(crate) ipam: Arc<FakeIpamAllocator>,
}

impl TestHarness {
    pub(crate) fn reconcile(&self) {
        self.manager.reconcile_pass();
    }

    pub(crate) fn total_writes(&self) -> usize {
        self.vrf_map.writes() + self.policy_map.writes() + self.sid_map.writes()
    }
}

/// A manager that is past both startup latches, backed by fake maps and the
/// fixed-SID default allocator.
pub(crate) fn harness() -> TestHarness {
    let h = bare_harness(true);
    h.manager.set_sid_allocator(h.ipam.clone());
    h.manager.set_synced();
    h
}

/// A manager before cache sync and allocator installation.
pub(crate) fn bare_harness(enable_srv6: bool) -> TestHarness {
    let vrf_map = FakeMap::new();
    let policy_map = FakeMap::new();
    let sid_map = FakeMap::new();
    let signaler = Arc::new(CountingSignaler::new());
    let ipam = Arc::new(FakeIpamAllocator::new(addr6(SID2)));
    let manager = Srv6Manager::new(
        ManagerConfig { enable_srv6 },
        vrf_map.clone(),
        policy_map.clone(),
        sid_map.clone(),
        signaler.clone(),
    );
    TestHarness {
        manager,
        vrf_map,
        policy_map,
        sid_map,
        signaler,
        ipam,
    }
}

pub(crate) fn addr6(addr: &str) -> Ipv6Addr {
    addr.parse().unwrap()
}

pub(crate) fn test_sid(addr: &str) -> Sid {
    Sid::new(addr6(addr), SidStructure::new(32, 16, 16, 0).unwrap())
}

pub(crate) fn endpoint1() -> Endpoint {
    let mut labels = BTreeMap::new();
    labels.insert("vrf".to_string(), "vrf0".to_string());
    Endpoint {
        id: EndpointId {
            namespace: "default".into(),
            name: "pod1".into(),
        },
        labels,
        ips: vec![Ipv4Addr::new(10, 0, 0, 1)],
        identity: Some(1000),
    }
}

pub(crate) fn pod_selector(key: &str, value: &str) -> EndpointSelector {
    let mut match_labels = BTreeMap::new();
    match_labels.insert(key.to_string(), value.to_string());
    EndpointSelector {
        pod_selector: Some(LabelSelector {
            match_labels: Some(match_labels),
            match_expressions: None,
        }),
    }
}

fn base_vrf_spec() -> SRv6VRFSpec {
    SRv6VRFSpec {
        vrf_id: 1,
        export_route_target: None,
        locator_pool_ref: None,
        rules: vec![VRFRule {
            selectors: vec![pod_selector("vrf", "vrf0")],
            destination_cidrs: vec!["0.0.0.0/0".into()],
        }],
    }
}

/// Parse a VRF fixture through the real parser, with the spec adjusted by
/// the caller.
pub(crate) fn vrf_named(name: &str, adjust: impl FnOnce(&mut SRv6VRFSpec)) -> Vrf {
    let mut spec = base_vrf_spec();
    adjust(&mut spec);
    parser::parse_vrf(&SRv6VRF::new(name, spec)).unwrap()
}

pub(crate) fn vrf0() -> Vrf {
    vrf_named("vrf0", |_| {})
}

pub(crate) fn vrf0_with(adjust: impl FnOnce(&mut SRv6VRFSpec)) -> Vrf {
    vrf_named("vrf0", adjust)
}

pub(crate) fn policy0() -> EgressPolicy {
    parser::parse_policy(&SRv6EgressPolicy::new(
        "policy0",
        SRv6EgressPolicySpec {
            vrf_id: 1,
            destination_cidrs: vec!["10.0.0.0/24".into()],
            destination_sid: SID1.into(),
        },
    ))
    .unwrap()
}

pub(crate) fn restored_info(metadata: &str, sid_addr: &str) -> SidInfo {
    SidInfo {
        owner: OWNER_NAME.to_string(),
        metadata: metadata.to_string(),
        sid: test_sid(sid_addr),
        behavior_type: BehaviorType::Base,
        behavior: Behavior::EndDT4,
    }
}

pub(crate) fn vrf_key(ip: &str, cidr: &str) -> VrfKey {
    let ip: Ipv4Addr = ip.parse().unwrap();
    let net: Ipv4Net = cidr.parse().unwrap();
    VrfKey::new(ip, net.network(), net.prefix_len())
}

pub(crate) fn policy_key(vrf_id: u32, cidr: &str) -> PolicyKey {
    let net: Ipv4Net = cidr.parse().unwrap();
    PolicyKey::new(vrf_id, net.network(), net.prefix_len())
}

pub(crate) fn sid_key(addr: &str) -> SidKey {
    SidKey::new(addr6(addr))
}
