use std::sync::Arc;

use srv6_mesh_common::SidInfo;
use tracing::{debug, info, warn};

use crate::manager::allocator::{SidAllocator, SidManagerSubscriber};
use crate::manager::{OWNER_NAME, SidSource, Srv6Manager, State};

impl<V, P, S> SidManagerSubscriber for Srv6Manager<V, P, S>
where
    V: Send + 'static,
    P: Send + 'static,
    S: Send + 'static,
{
    fn on_add_locator(&self, pool: &str, allocator: Arc<dyn SidAllocator>) {
        info!(pool, "locator pool added");
        let mut state = self.lock();
        state.pools.insert(pool.to_string(), allocator.clone());
        restore_pool_allocations(&mut state, pool, allocator.as_ref());
        drop(state);
        self.wake();
    }

    fn on_update_locator(
        &self,
        pool: &str,
        old: Arc<dyn SidAllocator>,
        new: Arc<dyn SidAllocator>,
    ) {
        info!(pool, "locator pool updated");
        let mut state = self.lock();
        state.pools.insert(pool.to_string(), new.clone());

        let source = SidSource::Pool(pool.to_string());
        let new_type = new.behavior_type();
        for (name, entry) in state.vrfs.iter_mut() {
            if entry.sid_source.as_ref() != Some(&source) {
                continue;
            }
            let Some(info) = entry.sid_info.as_ref() else {
                continue;
            };
            if info.behavior_type == new_type {
                continue;
            }
            // the locator's scheme changed; the stale SID goes back to the
            // old allocator and the next pass allocates from the new one
            debug!(vrf = %name, sid = %info.sid, "behavior type changed, releasing SID");
            if let Err(e) = old.release(info.sid.addr()) {
                warn!(%e, vrf = %name, "failed to release SID on locator update");
            }
            entry.sid_info = None;
            entry.sid_source = None;
        }
        drop(state);
        self.wake();
    }

    fn on_delete_locator(&self, pool: &str, _allocator: Arc<dyn SidAllocator>) {
        info!(pool, "locator pool deleted");
        let mut state = self.lock();
        state.pools.remove(pool);

        // the pool's allocations ceased to exist with it; drop the bindings
        // and let the next pass remove the map entries
        let source = SidSource::Pool(pool.to_string());
        for (name, entry) in state.vrfs.iter_mut() {
            if entry.sid_source.as_ref() != Some(&source) {
                continue;
            }
            debug!(vrf = %name, "dropping SID of deleted locator pool");
            entry.sid_info = None;
            entry.sid_source = None;
        }
        drop(state);
        self.wake();
    }
}

/// Reconcile allocations the pool reports as previously owned by this
/// manager against the current VRF specs. Compatible allocations are adopted
/// unchanged, everything else is released.
fn restore_pool_allocations<V, P, S>(
    state: &mut State<V, P, S>,
    pool: &str,
    allocator: &dyn SidAllocator,
) {
    let mut allocations = allocator.allocated_sids(OWNER_NAME);
    if allocations.is_empty() {
        return;
    }
    // adopt duplicates deterministically: earliest SID wins
    allocations.sort_by_key(|info| info.sid.octets());

    for info in allocations {
        if adopt_restored_sid(state, pool, &info) {
            continue;
        }
        debug!(vrf = %info.metadata, sid = %info.sid, "releasing unrestorable SID");
        if let Err(e) = allocator.release(info.sid.addr()) {
            warn!(%e, sid = %info.sid, "failed to release unrestorable SID");
        }
    }
}

fn adopt_restored_sid<V, P, S>(state: &mut State<V, P, S>, pool: &str, info: &SidInfo) -> bool {
    let sid_taken = state.vrfs.values().any(|entry| {
        entry
            .sid_info
            .as_ref()
            .is_some_and(|held| held.sid.addr() == info.sid.addr())
    });
    if sid_taken {
        return false;
    }
    match state.vrfs.get_mut(&info.metadata) {
        Some(entry)
            if entry.config.export_route_target.is_some()
                && entry.config.locator_pool_ref.as_deref() == Some(pool)
                && entry.sid_info.is_none() =>
        {
            info!(vrf = %info.metadata, sid = %info.sid, "restored SID allocation");
            entry.sid_source = Some(SidSource::Pool(pool.to_string()));
            entry.sid_info = Some(info.clone());
            true
        }
        _ => false,
    }
}
