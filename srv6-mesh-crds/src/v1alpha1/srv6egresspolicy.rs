use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const NAME_GROUP_SRV6EGRESSPOLICY: &str = "srv6egresspolicies.srv6-mesh.dev";

/// An explicit VRF-scoped egress route: traffic in the VRF towards the
/// destination CIDRs is steered to the destination SID, bypassing endpoint
/// selection.
#[derive(CustomResource, JsonSchema, Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
#[kube(
    group = "srv6-mesh.dev",
    version = "v1alpha1",
    kind = "SRv6EgressPolicy",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct SRv6EgressPolicySpec {
    #[serde(rename = "vrfID")]
    pub vrf_id: u32,

    #[serde(rename = "destinationCIDRs")]
    pub destination_cidrs: Vec<String>,

    #[serde(rename = "destinationSID")]
    pub destination_sid: String,
}
