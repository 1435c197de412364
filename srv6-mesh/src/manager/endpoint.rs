use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::net::Ipv4Addr;

use kube::core::{Selector, SelectorExt};
use srv6_mesh_common::IdentityId;

/// Stable workload identifier: namespace plus pod name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId {
    pub namespace: String,
    pub name: String,
}

impl Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One workload as indexed by the manager. An endpoint without a resolved
/// identity is held but contributes nothing to VRF selection.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub id: EndpointId,
    pub labels: BTreeMap<String, String>,
    pub ips: Vec<Ipv4Addr>,
    pub identity: Option<IdentityId>,
}

/// Evaluate a rule's selectors across the endpoint index. An empty selector
/// list matches nothing.
pub(crate) fn ips_matching<'a>(
    endpoints: impl Iterator<Item = &'a Endpoint>,
    selectors: &[Selector],
) -> BTreeSet<Ipv4Addr> {
    let mut ips = BTreeSet::new();
    if selectors.is_empty() {
        return ips;
    }
    for endpoint in endpoints {
        if endpoint.identity.is_none() {
            continue;
        }
        if selectors
            .iter()
            .any(|selector| selector.matches(&endpoint.labels))
        {
            ips.extend(endpoint.ips.iter().copied());
        }
    }
    ips
}

#[cfg(test)]
mod tests {
    use kube::core::Expression;

    use super::*;

    fn endpoint(name: &str, key: &str, value: &str, ip: Ipv4Addr) -> Endpoint {
        let mut labels = BTreeMap::new();
        labels.insert(key.to_string(), value.to_string());
        Endpoint {
            id: EndpointId {
                namespace: "default".into(),
                name: name.into(),
            },
            labels,
            ips: vec![ip],
            identity: Some(1000),
        }
    }

    #[test]
    fn matching_endpoints_contribute_their_ips() {
        let eps = vec![
            endpoint("pod1", "vrf", "vrf0", Ipv4Addr::new(10, 0, 0, 1)),
            endpoint("pod2", "vrf", "vrf1", Ipv4Addr::new(10, 0, 0, 2)),
        ];
        let selector: Selector = Expression::Equal("vrf".into(), "vrf0".into()).into();

        let ips = ips_matching(eps.iter(), &[selector]);
        assert_eq!(ips.len(), 1);
        assert!(ips.contains(&Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn empty_selector_list_matches_nothing() {
        let eps = vec![endpoint("pod1", "vrf", "vrf0", Ipv4Addr::new(10, 0, 0, 1))];
        assert!(ips_matching(eps.iter(), &[]).is_empty());
    }

    #[test]
    fn endpoints_without_identity_are_inactive() {
        let mut ep = endpoint("pod1", "vrf", "vrf0", Ipv4Addr::new(10, 0, 0, 1));
        ep.identity = None;
        let selector: Selector = Expression::Equal("vrf".into(), "vrf0".into()).into();

        assert!(ips_matching([&ep].into_iter(), &[selector]).is_empty());
    }

    #[test]
    fn any_selector_in_the_rule_matches() {
        let eps = vec![
            endpoint("pod1", "vrf", "vrf0", Ipv4Addr::new(10, 0, 0, 1)),
            endpoint("pod2", "vrf", "vrf1", Ipv4Addr::new(10, 0, 0, 2)),
        ];
        let selectors: Vec<Selector> = vec![
            Expression::Equal("vrf".into(), "vrf0".into()).into(),
            Expression::Equal("vrf".into(), "vrf1".into()).into(),
        ];

        assert_eq!(ips_matching(eps.iter(), &selectors).len(), 2);
    }
}
