use std::fmt::Display;
use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// SID allocation scheme advertised by a locator pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorType {
    Base,
    USid,
}

/// Concrete datapath function encoded by a SID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Behavior {
    EndDT4,
    EndDT6,
    UDT4,
    UDT6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl Behavior {
    /// Derive the datapath function from the allocation scheme and the
    /// address family of the routes the VRF carries.
    pub fn from_type(behavior_type: BehaviorType, family: AddressFamily) -> Self {
        match (behavior_type, family) {
            (BehaviorType::Base, AddressFamily::V4) => Behavior::EndDT4,
            (BehaviorType::Base, AddressFamily::V6) => Behavior::EndDT6,
            (BehaviorType::USid, AddressFamily::V4) => Behavior::UDT4,
            (BehaviorType::USid, AddressFamily::V6) => Behavior::UDT6,
        }
    }
}

impl Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Behavior::EndDT4 => write!(f, "End.DT4"),
            Behavior::EndDT6 => write!(f, "End.DT6"),
            Behavior::UDT4 => write!(f, "uDT4"),
            Behavior::UDT6 => write!(f, "uDT6"),
        }
    }
}

/// Bit layout of a SID: locator block, locator node, function and argument
/// lengths. The four parts must fit in the 128 address bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SidStructure {
    pub locator_block_len: u8,
    pub locator_node_len: u8,
    pub function_len: u8,
    pub argument_len: u8,
}

impl SidStructure {
    pub fn new(
        locator_block_len: u8,
        locator_node_len: u8,
        function_len: u8,
        argument_len: u8,
    ) -> Result<Self> {
        let total = locator_block_len as u16
            + locator_node_len as u16
            + function_len as u16
            + argument_len as u16;
        if total > 128 {
            return Err(Error::InvalidSidStructure(format!(
                "structure spans {total} bits, exceeds 128"
            )));
        }
        Ok(Self {
            locator_block_len,
            locator_node_len,
            function_len,
            argument_len,
        })
    }

    pub fn locator_len(&self) -> u8 {
        self.locator_block_len + self.locator_node_len
    }
}

/// A Segment Identifier: an IPv6 address together with its bit layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sid {
    addr: Ipv6Addr,
    structure: SidStructure,
}

impl Sid {
    pub fn new(addr: Ipv6Addr, structure: SidStructure) -> Self {
        Self { addr, structure }
    }

    /// A SID handed out by an allocator that does not expose a structure,
    /// such as the default IPAM allocator.
    pub fn unstructured(addr: Ipv6Addr) -> Self {
        Self {
            addr,
            structure: SidStructure::default(),
        }
    }

    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    pub fn structure(&self) -> SidStructure {
        self.structure
    }

    pub fn octets(&self) -> [u8; 16] {
        self.addr.octets()
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// One allocation as reported by (and to) a SID allocator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidInfo {
    pub owner: String,
    pub metadata: String,
    pub sid: Sid,
    pub behavior_type: BehaviorType,
    pub behavior: Behavior,
}
