use std::net::Ipv6Addr;
use std::sync::Mutex;

use ipnet::Ipv6Net;
use tracing::debug;

use crate::manager::allocator::IpamAllocator;
use crate::{Error, Result};

/// Default SID allocator: hands out addresses from a configured prefix,
/// sequentially, reusing released addresses first.
pub struct PrefixAllocator {
    prefix: Ipv6Net,
    inner: Mutex<PrefixAllocatorInner>,
}

struct PrefixAllocatorInner {
    next: u128,
    free: Vec<Ipv6Addr>,
    allocated: ahash::HashMap<Ipv6Addr, String>,
}

impl PrefixAllocator {
    pub fn new(prefix: Ipv6Net) -> Self {
        Self {
            prefix: prefix.trunc(),
            inner: Mutex::new(PrefixAllocatorInner {
                // skip the network address itself
                next: 1,
                free: Vec::new(),
                allocated: ahash::HashMap::default(),
            }),
        }
    }

    fn capacity(&self) -> u128 {
        let host_bits = 128 - self.prefix.prefix_len();
        if host_bits >= 128 {
            u128::MAX
        } else {
            (1u128 << host_bits) - 1
        }
    }
}

impl IpamAllocator for PrefixAllocator {
    fn allocate_next(&self, owner: &str) -> Result<Ipv6Addr> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(addr) = inner.free.pop() {
            inner.allocated.insert(addr, owner.to_string());
            return Ok(addr);
        }
        if inner.next > self.capacity() {
            return Err(Error::AllocationFailed(format!(
                "prefix {} exhausted",
                self.prefix
            )));
        }
        let base = u128::from(self.prefix.network());
        let addr = Ipv6Addr::from(base | inner.next);
        inner.next += 1;
        inner.allocated.insert(addr, owner.to_string());
        Ok(addr)
    }

    fn release(&self, addr: Ipv6Addr) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.allocated.remove(&addr).is_some() {
            inner.free.push(addr);
        } else {
            debug!(%addr, "release of unallocated address ignored");
        }
        Ok(())
    }
}
