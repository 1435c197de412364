#![no_std]

use core::fmt::Display;
use core::net::{Ipv4Addr, Ipv6Addr};

/// Egress classification: (source IPv4, destination CIDR) -> VRF.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct VrfKey {
    pub src_ip: u32,
    pub dst_cidr: u32,
    pub dst_prefix_len: u8,
    pub _pad: [u8; 3],
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for VrfKey {}

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct VrfValue {
    pub vrf_id: u32,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for VrfValue {}

/// Steering: (VRF, destination CIDR) -> SID the packet is encapsulated towards.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PolicyKey {
    pub vrf_id: u32,
    pub dst_cidr: u32,
    pub dst_prefix_len: u8,
    pub _pad: [u8; 3],
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for PolicyKey {}

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PolicyValue {
    pub sid: [u8; 16],
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for PolicyValue {}

/// Local decapsulation binding: SID -> VRF.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SidKey {
    pub sid: [u8; 16],
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SidKey {}

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SidValue {
    pub vrf_id: u32,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SidValue {}

impl VrfKey {
    pub fn new(src_ip: Ipv4Addr, dst_cidr: Ipv4Addr, dst_prefix_len: u8) -> Self {
        Self {
            src_ip: src_ip.to_bits(),
            dst_cidr: dst_cidr.to_bits(),
            dst_prefix_len,
            _pad: [0; 3],
        }
    }

    pub fn src_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.src_ip)
    }

    pub fn dst_cidr(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.dst_cidr)
    }
}

impl Display for VrfKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} -> {}/{}",
            self.src_ip(),
            self.dst_cidr(),
            self.dst_prefix_len
        )
    }
}

impl PolicyKey {
    pub fn new(vrf_id: u32, dst_cidr: Ipv4Addr, dst_prefix_len: u8) -> Self {
        Self {
            vrf_id,
            dst_cidr: dst_cidr.to_bits(),
            dst_prefix_len,
            _pad: [0; 3],
        }
    }

    pub fn dst_cidr(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.dst_cidr)
    }
}

impl Display for PolicyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "vrf {} -> {}/{}",
            self.vrf_id,
            self.dst_cidr(),
            self.dst_prefix_len
        )
    }
}

impl PolicyValue {
    pub fn new(sid: Ipv6Addr) -> Self {
        Self { sid: sid.octets() }
    }

    pub fn sid(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.sid)
    }
}

impl SidKey {
    pub fn new(sid: Ipv6Addr) -> Self {
        Self { sid: sid.octets() }
    }

    pub fn sid(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.sid)
    }
}

impl Display for SidKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.sid())
    }
}
