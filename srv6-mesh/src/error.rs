use std::net::Ipv6Addr;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid CIDR {0:?}")]
    InvalidCidr(String),

    #[error("invalid SID {0:?}")]
    InvalidSid(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("rules must have at least one selector and one destination CIDR")]
    EmptyRules,

    #[error("invalid route target {0:?}")]
    InvalidRouteTarget(String),

    #[error("locator pool {0:?} is not known")]
    PoolMissing(String),

    #[error("SID allocation failed: {0}")]
    AllocationFailed(String),

    #[error("SID {0} claimed with conflicting VRF ids")]
    SidConflict(Ipv6Addr),

    #[error("identity resolution failed: {0}")]
    Identity(String),

    #[error("key does not exist")]
    KeyNotExist,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("bpf map error: {0}")]
    Map(#[from] aya::maps::MapError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("crd error: {0}")]
    Crds(#[from] srv6_mesh_crds::Error),
}
