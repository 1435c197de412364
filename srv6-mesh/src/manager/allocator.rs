use std::net::Ipv6Addr;
use std::sync::Arc;

use srv6_mesh_common::{AddressFamily, Behavior, BehaviorType, SidInfo};

use crate::manager::OWNER_NAME;
use crate::{Error, Result};

/// The default SID allocator, installed late by the agent's IPAM layer.
pub trait IpamAllocator: Send + Sync {
    fn allocate_next(&self, owner: &str) -> Result<Ipv6Addr>;
    fn release(&self, addr: Ipv6Addr) -> Result<()>;
}

/// A locator pool's allocator, as exposed by the SID manager.
pub trait SidAllocator: Send + Sync {
    fn behavior_type(&self) -> BehaviorType;
    fn allocate(
        &self,
        addr: Ipv6Addr,
        owner: &str,
        metadata: &str,
        behavior: Behavior,
    ) -> Result<SidInfo>;
    fn allocate_next(&self, owner: &str, metadata: &str, behavior: Behavior) -> Result<SidInfo>;
    fn release(&self, addr: Ipv6Addr) -> Result<()>;
    fn allocated_sids(&self, owner: &str) -> Vec<SidInfo>;
}

/// The external SID manager. `manage_sid` is the serialization point for all
/// access to one pool and errors when the pool does not exist.
pub trait SidManager: Send + Sync {
    fn manage_sid(
        &self,
        pool: &str,
        f: &mut dyn FnMut(&dyn SidAllocator) -> Result<bool>,
    ) -> Result<()>;

    fn subscribe(
        &self,
        subscriber_name: &str,
        subscriber: Arc<dyn SidManagerSubscriber>,
        done: Box<dyn FnOnce() + Send>,
    );
}

/// Locator pool lifecycle callbacks delivered by the SID manager
/// subscription.
pub trait SidManagerSubscriber: Send + Sync {
    fn on_add_locator(&self, pool: &str, allocator: Arc<dyn SidAllocator>);
    fn on_update_locator(
        &self,
        pool: &str,
        old: Arc<dyn SidAllocator>,
        new: Arc<dyn SidAllocator>,
    );
    fn on_delete_locator(&self, pool: &str, allocator: Arc<dyn SidAllocator>);
}

/// Allocate a SID for a VRF from the named pool. The pool allocator's
/// advertised behavior type determines the behavior action.
pub(crate) fn allocate_from_pool(
    manager: &dyn SidManager,
    pool: &str,
    vrf_name: &str,
) -> Result<SidInfo> {
    let mut allocated = None;
    manager.manage_sid(pool, &mut |allocator| {
        let behavior = Behavior::from_type(allocator.behavior_type(), AddressFamily::V4);
        allocated = Some(allocator.allocate_next(OWNER_NAME, vrf_name, behavior)?);
        Ok(true)
    })?;
    allocated.ok_or_else(|| Error::AllocationFailed(format!("pool {pool} returned no SID")))
}

pub(crate) fn release_to_pool(manager: &dyn SidManager, pool: &str, addr: Ipv6Addr) -> Result<()> {
    manager.manage_sid(pool, &mut |allocator| {
        allocator.release(addr)?;
        Ok(true)
    })
}
