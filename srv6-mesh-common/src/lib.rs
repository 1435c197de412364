pub mod sid;

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sid::{AddressFamily, Behavior, BehaviorType, Sid, SidInfo, SidStructure};

pub type VrfId = u32;
pub type IdentityId = u32;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid route target {0:?}")]
    InvalidRouteTarget(String),

    #[error("invalid SID structure: {0}")]
    InvalidSidStructure(String),
}

/// BGP VPN route target in `ASN:value` notation, e.g. `65000:1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteTarget {
    pub asn: u32,
    pub value: u32,
}

impl FromStr for RouteTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((asn, value)) = s.split_once(':') else {
            return Err(Error::InvalidRouteTarget(s.into()));
        };
        let asn = asn
            .parse()
            .map_err(|_| Error::InvalidRouteTarget(s.into()))?;
        let value = value
            .parse()
            .map_err(|_| Error::InvalidRouteTarget(s.into()))?;
        Ok(Self { asn, value })
    }
}

impl Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.asn, self.value)
    }
}

impl TryFrom<String> for RouteTarget {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RouteTarget> for String {
    fn from(value: RouteTarget) -> Self {
        value.to_string()
    }
}
