use std::net::Ipv6Addr;

use ipnet::Ipv4Net;
use kube::ResourceExt;
use kube::core::Selector;
use serde::Serialize;
use sha2::{Digest, Sha256};
use srv6_mesh_crds::v1alpha1::srv6egresspolicy::SRv6EgressPolicy;
use srv6_mesh_crds::v1alpha1::srv6vrf::SRv6VRF;

use crate::manager::{EgressPolicy, Vrf, VrfRule};
use crate::{Error, Result};

/// Validate and normalize an inbound VRF resource.
pub fn parse_vrf(vrf: &SRv6VRF) -> Result<Vrf> {
    let spec = &vrf.spec;

    let export_route_target = match spec.export_route_target.as_deref() {
        None | Some("") => None,
        Some(rt) => Some(
            rt.parse()
                .map_err(|_| Error::InvalidRouteTarget(rt.to_string()))?,
        ),
    };
    let locator_pool_ref = spec.locator_pool_ref.clone().filter(|p| !p.is_empty());

    if spec.rules.is_empty() {
        return Err(Error::EmptyRules);
    }
    let mut rules = Vec::with_capacity(spec.rules.len());
    for rule in &spec.rules {
        if rule.selectors.is_empty() || rule.destination_cidrs.is_empty() {
            return Err(Error::EmptyRules);
        }
        let mut selectors = Vec::with_capacity(rule.selectors.len());
        for selector in &rule.selectors {
            let Some(pod_selector) = &selector.pod_selector else {
                return Err(Error::InvalidSelector(
                    "endpoint selector has no podSelector".into(),
                ));
            };
            selectors.push(
                Selector::try_from(pod_selector.clone())
                    .map_err(|e| Error::InvalidSelector(e.to_string()))?,
            );
        }
        rules.push(VrfRule {
            selectors,
            dst_cidrs: parse_cidrs(&rule.destination_cidrs)?,
        });
    }

    Ok(Vrf {
        name: vrf.name_any(),
        vrf_id: spec.vrf_id,
        export_route_target,
        locator_pool_ref,
        rules,
        rules_fingerprint: fingerprint(&spec.rules)?,
    })
}

/// Validate and normalize an inbound egress policy resource.
pub fn parse_policy(policy: &SRv6EgressPolicy) -> Result<EgressPolicy> {
    let spec = &policy.spec;

    if spec.destination_cidrs.is_empty() {
        return Err(Error::EmptyRules);
    }
    let dst_sid: Ipv6Addr = spec
        .destination_sid
        .parse()
        .map_err(|_| Error::InvalidSid(spec.destination_sid.clone()))?;

    Ok(EgressPolicy {
        name: policy.name_any(),
        vrf_id: spec.vrf_id,
        dst_cidrs: parse_cidrs(&spec.destination_cidrs)?,
        dst_sid,
    })
}

/// Parse CIDRs and reduce each to its network address.
fn parse_cidrs(raw: &[String]) -> Result<Vec<Ipv4Net>> {
    raw.iter()
        .map(|s| {
            s.parse::<Ipv4Net>()
                .map(|net| net.trunc())
                .map_err(|_| Error::InvalidCidr(s.clone()))
        })
        .collect()
}

fn fingerprint<T: Serialize>(value: &T) -> Result<u64> {
    let bytes = serde_json::to_vec(value)?;
    let digest = Sha256::digest(&bytes);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use srv6_mesh_crds::v1alpha1::srv6egresspolicy::SRv6EgressPolicySpec;
    use srv6_mesh_crds::v1alpha1::srv6vrf::{EndpointSelector, SRv6VRFSpec, VRFRule};

    use super::*;

    fn selector(key: &str, value: &str) -> EndpointSelector {
        let mut match_labels = BTreeMap::new();
        match_labels.insert(key.to_string(), value.to_string());
        EndpointSelector {
            pod_selector: Some(LabelSelector {
                match_labels: Some(match_labels),
                match_expressions: None,
            }),
        }
    }

    fn vrf(spec: SRv6VRFSpec) -> SRv6VRF {
        SRv6VRF::new("vrf0", spec)
    }

    fn valid_spec() -> SRv6VRFSpec {
        SRv6VRFSpec {
            vrf_id: 1,
            export_route_target: None,
            locator_pool_ref: None,
            rules: vec![VRFRule {
                selectors: vec![selector("vrf", "vrf0")],
                destination_cidrs: vec!["0.0.0.0/0".into()],
            }],
        }
    }

    #[test]
    fn parses_a_minimal_vrf() {
        let parsed = parse_vrf(&vrf(valid_spec())).unwrap();
        assert_eq!(parsed.name, "vrf0");
        assert_eq!(parsed.vrf_id, 1);
        assert!(parsed.export_route_target.is_none());
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(
            parsed.rules[0].dst_cidrs,
            vec!["0.0.0.0/0".parse::<Ipv4Net>().unwrap()]
        );
    }

    #[test]
    fn normalizes_cidrs_to_network_address() {
        let mut spec = valid_spec();
        spec.rules[0].destination_cidrs = vec!["10.0.0.5/24".into()];

        let parsed = parse_vrf(&vrf(spec)).unwrap();
        assert_eq!(
            parsed.rules[0].dst_cidrs,
            vec!["10.0.0.0/24".parse::<Ipv4Net>().unwrap()]
        );
    }

    #[test]
    fn rejects_invalid_cidr() {
        let mut spec = valid_spec();
        spec.rules[0].destination_cidrs = vec!["10.0.0.0/33".into()];
        assert!(matches!(
            parse_vrf(&vrf(spec)),
            Err(Error::InvalidCidr(_))
        ));
    }

    #[test]
    fn rejects_empty_rules() {
        let mut spec = valid_spec();
        spec.rules.clear();
        assert!(matches!(parse_vrf(&vrf(spec)), Err(Error::EmptyRules)));
    }

    #[test]
    fn rejects_rule_without_selectors() {
        let mut spec = valid_spec();
        spec.rules[0].selectors.clear();
        assert!(matches!(parse_vrf(&vrf(spec)), Err(Error::EmptyRules)));
    }

    #[test]
    fn rejects_rule_without_destinations() {
        let mut spec = valid_spec();
        spec.rules[0].destination_cidrs.clear();
        assert!(matches!(parse_vrf(&vrf(spec)), Err(Error::EmptyRules)));
    }

    #[test]
    fn rejects_invalid_route_target() {
        let mut spec = valid_spec();
        spec.export_route_target = Some("not-a-route-target".into());
        assert!(matches!(
            parse_vrf(&vrf(spec)),
            Err(Error::InvalidRouteTarget(_))
        ));
    }

    #[test]
    fn empty_route_target_means_no_export() {
        let mut spec = valid_spec();
        spec.export_route_target = Some(String::new());
        let parsed = parse_vrf(&vrf(spec)).unwrap();
        assert!(parsed.export_route_target.is_none());
    }

    #[test]
    fn rule_fingerprint_tracks_rule_changes() {
        let first = parse_vrf(&vrf(valid_spec())).unwrap();

        let mut changed = valid_spec();
        changed.rules[0].destination_cidrs = vec!["10.0.0.0/24".into()];
        let second = parse_vrf(&vrf(changed)).unwrap();

        assert_ne!(first.rules_fingerprint, second.rules_fingerprint);

        let same = parse_vrf(&vrf(valid_spec())).unwrap();
        assert_eq!(first.rules_fingerprint, same.rules_fingerprint);
    }

    #[test]
    fn parses_a_policy() {
        let policy = SRv6EgressPolicy::new(
            "policy0",
            SRv6EgressPolicySpec {
                vrf_id: 1,
                destination_cidrs: vec!["10.0.0.0/24".into()],
                destination_sid: "fd00:0:0:1::".into(),
            },
        );
        let parsed = parse_policy(&policy).unwrap();
        assert_eq!(parsed.name, "policy0");
        assert_eq!(parsed.vrf_id, 1);
        assert_eq!(parsed.dst_sid, "fd00:0:0:1::".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn rejects_invalid_policy_sid() {
        let policy = SRv6EgressPolicy::new(
            "policy0",
            SRv6EgressPolicySpec {
                vrf_id: 1,
                destination_cidrs: vec!["10.0.0.0/24".into()],
                destination_sid: "10.0.0.1".into(),
            },
        );
        assert!(matches!(
            parse_policy(&policy),
            Err(Error::InvalidSid(_))
        ));
    }

    #[test]
    fn rejects_policy_without_destinations() {
        let policy = SRv6EgressPolicy::new(
            "policy0",
            SRv6EgressPolicySpec {
                vrf_id: 1,
                destination_cidrs: vec![],
                destination_sid: "fd00:0:0:1::".into(),
            },
        );
        assert!(matches!(parse_policy(&policy), Err(Error::EmptyRules)));
    }
}
