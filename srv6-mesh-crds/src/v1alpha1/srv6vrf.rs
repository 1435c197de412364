use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const NAME_GROUP_SRV6VRF: &str = "srv6vrfs.srv6-mesh.dev";

/// A routing domain. Endpoints matched by the rules' selectors have their
/// egress traffic towards the destination CIDRs classified into this VRF.
#[derive(CustomResource, JsonSchema, Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
#[kube(
    group = "srv6-mesh.dev",
    version = "v1alpha1",
    kind = "SRv6VRF",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct SRv6VRFSpec {
    #[serde(rename = "vrfID")]
    pub vrf_id: u32,

    /// BGP VPN route target in `ASN:value` notation. Presence marks the VRF
    /// as externally advertised and gates SID allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_route_target: Option<String>,

    /// Name of the locator pool the SID must be allocated from. When unset,
    /// the node's default allocator is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator_pool_ref: Option<String>,

    pub rules: Vec<VRFRule>,
}

#[derive(JsonSchema, Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VRFRule {
    pub selectors: Vec<EndpointSelector>,

    #[serde(rename = "destinationCIDRs")]
    pub destination_cidrs: Vec<String>,
}

#[derive(JsonSchema, Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_selector: Option<LabelSelector>,
}
