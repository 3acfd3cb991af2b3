//! Network spec
//!
//! Provider selection, multus network selectors, address ranges and
//! on-wire connection settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::network::cidr::Cidr;

/// Logical network carrying client traffic
pub const PUBLIC_NETWORK: &str = "public";

/// Logical network carrying replication traffic
pub const CLUSTER_NETWORK: &str = "cluster";

/// Roles in the order they are discovered and applied
pub const NETWORK_ROLES: [&str; 2] = [PUBLIC_NETWORK, CLUSTER_NETWORK];

/// Pod annotation requesting multus attachments
pub const MULTUS_NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

// =============================================================================
// Types
// =============================================================================

/// Network provider of the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NetworkProvider {
    /// Platform pod network
    #[default]
    #[serde(rename = "")]
    Default,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "multus")]
    Multus,
}

impl std::fmt::Display for NetworkProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkProvider::Default => write!(f, ""),
            NetworkProvider::Host => write!(f, "host"),
            NetworkProvider::Multus => write!(f, "multus"),
        }
    }
}

/// IP family used by the daemons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum IpFamily {
    #[default]
    IPv4,
    IPv6,
}

/// Network settings of a cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    #[serde(default)]
    pub provider: NetworkProvider,

    /// Logical network name (`public`, `cluster`) to attachment selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selectors: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_ranges: Option<AddressRanges>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connections: Option<ConnectionsSpec>,

    /// Legacy host networking switch; only valid with the default provider
    #[serde(default)]
    pub host_network: bool,

    #[serde(default)]
    pub ip_family: IpFamily,

    #[serde(default)]
    pub dual_stack: bool,
}

/// User-supplied CIDRs per role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressRanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster: Vec<String>,
}

/// On-wire settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<Toggle>,
    #[serde(default)]
    pub require_msgr2: bool,
}

/// A feature switch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Toggle {
    #[serde(default)]
    pub enabled: bool,
}

/// One element of the multus networks annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSelectionElement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, rename = "interface", skip_serializing_if = "Option::is_none")]
    pub interface_request: Option<String>,
}

// =============================================================================
// Address Ranges
// =============================================================================

impl AddressRanges {
    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.cluster.is_empty()
    }

    /// Every range must parse as a CIDR
    pub fn validate(&self) -> Result<()> {
        let invalid: Vec<&String> = self
            .public
            .iter()
            .chain(self.cluster.iter())
            .filter(|r| r.parse::<Cidr>().is_err())
            .collect();
        if invalid.is_empty() {
            return Ok(());
        }
        Err(Error::validation(format!(
            "{} network ranges are invalid: {:?}",
            invalid.len(),
            invalid
        )))
    }

    /// Ranges for a role
    pub fn for_role(&self, role: &str) -> &[String] {
        match role {
            PUBLIC_NETWORK => &self.public,
            CLUSTER_NETWORK => &self.cluster,
            _ => &[],
        }
    }
}

// =============================================================================
// Network Spec
// =============================================================================

impl NetworkSpec {
    /// Host networking, via provider or the legacy flag
    pub fn is_host(&self) -> bool {
        self.provider == NetworkProvider::Host
            || (self.host_network && self.provider == NetworkProvider::Default)
    }

    /// Host networking, also forced on when the operator enforces it
    pub fn is_host_enforced(&self, enforce_host_network: bool) -> bool {
        self.is_host() || (enforce_host_network && self.provider == NetworkProvider::Default)
    }

    pub fn is_multus(&self) -> bool {
        self.provider == NetworkProvider::Multus
    }

    /// User-supplied ranges for a role, empty when none
    pub fn address_ranges_for(&self, role: &str) -> &[String] {
        self.address_ranges
            .as_ref()
            .map(|r| r.for_role(role))
            .unwrap_or(&[])
    }

    /// Whether a selector is configured for the role
    pub fn network_has_selection(&self, role: &str) -> bool {
        self.selectors
            .get(role)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }

    /// Parse the selector configured for a role
    ///
    /// Accepts `[namespace/]name[@interface]` or a JSON list holding exactly
    /// one element. The namespace defaults to `cluster_namespace`.
    pub fn get_network_selection(
        &self,
        role: &str,
        cluster_namespace: &str,
    ) -> Result<Option<NetworkSelectionElement>> {
        let Some(raw) = self.selectors.get(role) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let mut element = if raw.starts_with('[') {
            let mut list: Vec<NetworkSelectionElement> =
                serde_json::from_str(raw).map_err(|e| {
                    Error::validation(format!(
                        "failed to parse {} network selector {:?}: {}",
                        role, raw, e
                    ))
                })?;
            if list.len() != 1 {
                return Err(Error::validation(format!(
                    "{} network selector must select exactly one network, found {}",
                    role,
                    list.len()
                )));
            }
            list.remove(0)
        } else if raw.starts_with('{') {
            return Err(Error::validation(format!(
                "{} network selector {:?} is a single JSON object; use a JSON list of one element",
                role, raw
            )));
        } else {
            parse_selection_shorthand(raw).ok_or_else(|| {
                Error::validation(format!("invalid {} network selector {:?}", role, raw))
            })?
        };

        if element.name.is_empty() {
            return Err(Error::validation(format!(
                "{} network selector {:?} has no network name",
                role, raw
            )));
        }
        if element.namespace.as_deref().map_or(true, str::is_empty) {
            element.namespace = Some(cluster_namespace.to_string());
        }
        Ok(Some(element))
    }

    /// Value of the multus networks annotation for the given roles
    ///
    /// Public is always rendered before cluster. None if nothing is selected.
    pub fn networks_annotation(
        &self,
        cluster_namespace: &str,
        roles: &[&str],
    ) -> Result<Option<String>> {
        let mut elements = Vec::new();
        for role in NETWORK_ROLES {
            if !roles.contains(&role) {
                continue;
            }
            if let Some(el) = self.get_network_selection(role, cluster_namespace)? {
                elements.push(el);
            }
        }
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&elements)?))
    }

    /// Static checks on the network spec
    pub fn validate(&self) -> Result<()> {
        if self.host_network && self.provider != NetworkProvider::Default {
            return Err(Error::validation(format!(
                "the legacy hostNetwork setting is only valid with the default network provider, not {:?}",
                self.provider.to_string()
            )));
        }

        for (role, _) in &self.selectors {
            if role != PUBLIC_NETWORK && role != CLUSTER_NETWORK {
                return Err(Error::validation(format!(
                    "unknown network selector {:?}, only public and cluster are supported",
                    role
                )));
            }
        }
        if !self.selectors.is_empty() {
            if !self.is_multus() {
                return Err(Error::validation(
                    "network selectors are only supported with the multus provider",
                ));
            }
            for role in NETWORK_ROLES {
                self.get_network_selection(role, "")?;
            }
        }

        if let Some(ranges) = &self.address_ranges {
            ranges.validate()?;
        }
        Ok(())
    }

    /// Whether msgr2 must be used on the wire
    pub fn requires_msgr2(&self) -> bool {
        match &self.connections {
            Some(c) => {
                c.require_msgr2
                    || c.encryption.as_ref().map_or(false, |t| t.enabled)
                    || c.compression.as_ref().map_or(false, |t| t.enabled)
            }
            None => false,
        }
    }
}

/// Parse `[namespace/]name[@interface]`
fn parse_selection_shorthand(raw: &str) -> Option<NetworkSelectionElement> {
    let (ns_name, interface) = match raw.split_once('@') {
        Some((left, iface)) if !iface.is_empty() => (left, Some(iface.to_string())),
        Some(_) => return None,
        None => (raw, None),
    };
    let (namespace, name) = match ns_name.split_once('/') {
        Some((ns, name)) => (Some(ns.to_string()), name),
        None => (None, ns_name),
    };
    if name.is_empty() || name.contains('/') || name.contains('@') {
        return None;
    }
    Some(NetworkSelectionElement {
        name: name.to_string(),
        namespace,
        interface_request: interface,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multus(selectors: &[(&str, &str)]) -> NetworkSpec {
        NetworkSpec {
            provider: NetworkProvider::Multus,
            selectors: selectors
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_host() {
        let mut net = NetworkSpec::default();
        assert!(!net.is_host());
        net.host_network = true;
        assert!(net.is_host());
        net.provider = NetworkProvider::Multus;
        assert!(!net.is_host());
        net = NetworkSpec {
            provider: NetworkProvider::Host,
            ..Default::default()
        };
        assert!(net.is_host());
        assert!(NetworkSpec::default().is_host_enforced(true));
        assert!(!multus(&[]).is_host_enforced(true));
    }

    #[test]
    fn test_validate_host_network_with_provider() {
        let net = NetworkSpec {
            provider: NetworkProvider::Host,
            host_network: true,
            ..Default::default()
        };
        assert!(net.validate().is_err());

        let net = NetworkSpec {
            host_network: true,
            ..Default::default()
        };
        assert!(net.validate().is_ok());
    }

    #[test]
    fn test_selection_shorthand() {
        let net = multus(&[("public", "macvlan@net1"), ("cluster", "other/macvlan2")]);
        let el = net.get_network_selection("public", "ns").unwrap().unwrap();
        assert_eq!(el.name, "macvlan");
        assert_eq!(el.namespace.as_deref(), Some("ns"));
        assert_eq!(el.interface_request.as_deref(), Some("net1"));

        let el = net.get_network_selection("cluster", "ns").unwrap().unwrap();
        assert_eq!(el.namespace.as_deref(), Some("other"));
        assert_eq!(el.interface_request, None);

        assert!(net.get_network_selection("storage", "ns").unwrap().is_none());
    }

    #[test]
    fn test_selection_json_list_only() {
        let net = multus(&[("public", r#"[{"name": "macvlan", "interface": "net1"}]"#)]);
        let el = net.get_network_selection("public", "ns").unwrap().unwrap();
        assert_eq!(el.name, "macvlan");
        assert_eq!(el.interface_request.as_deref(), Some("net1"));

        let net = multus(&[("public", r#"{"name": "macvlan", "interface": "net1"}"#)]);
        assert!(net.get_network_selection("public", "ns").is_err());

        let net = multus(&[("public", r#"[{"name": "a"}, {"name": "b"}]"#)]);
        assert!(net.get_network_selection("public", "ns").is_err());
    }

    #[test]
    fn test_networks_annotation_order() {
        let net = multus(&[("cluster", "macvlan@net2"), ("public", "macvlan@net1")]);
        let ann = net
            .networks_annotation("ns", &[CLUSTER_NETWORK, PUBLIC_NETWORK])
            .unwrap()
            .unwrap();
        assert_eq!(
            ann,
            r#"[{"name":"macvlan","namespace":"ns","interface":"net1"},{"name":"macvlan","namespace":"ns","interface":"net2"}]"#
        );

        let ann = net.networks_annotation("ns", &[PUBLIC_NETWORK]).unwrap().unwrap();
        assert_eq!(ann, r#"[{"name":"macvlan","namespace":"ns","interface":"net1"}]"#);

        assert!(multus(&[]).networks_annotation("ns", &NETWORK_ROLES).unwrap().is_none());
    }

    #[test]
    fn test_address_ranges() {
        let ranges = AddressRanges::default();
        assert!(ranges.is_empty());
        assert!(ranges.validate().is_ok());

        let ranges = AddressRanges {
            public: vec!["192.168.0.0/24".into(), "fd00::/64".into()],
            cluster: vec!["10.0.0.0".into(), "bogus/12".into()],
        };
        assert!(!ranges.is_empty());
        let err = ranges.validate().unwrap_err();
        assert!(err.to_string().starts_with("2 network ranges are invalid"));
    }

    #[test]
    fn test_validate_selectors_require_multus() {
        let mut net = multus(&[("public", "macvlan@net1")]);
        assert!(net.validate().is_ok());
        net.provider = NetworkProvider::Default;
        assert!(net.validate().is_err());

        let net = multus(&[("storage", "macvlan@net1")]);
        assert!(net.validate().is_err());
    }

    #[test]
    fn test_requires_msgr2() {
        let mut net = NetworkSpec::default();
        assert!(!net.requires_msgr2());
        net.connections = Some(ConnectionsSpec {
            encryption: Some(Toggle { enabled: true }),
            ..Default::default()
        });
        assert!(net.requires_msgr2());
    }

    #[test]
    fn test_provider_serde() {
        let net: NetworkSpec = serde_json::from_str(r#"{"provider": ""}"#).unwrap();
        assert_eq!(net.provider, NetworkProvider::Default);
        let net: NetworkSpec = serde_json::from_str(r#"{"provider": "multus"}"#).unwrap();
        assert!(net.is_multus());
        assert!(serde_json::from_str::<NetworkSpec>(r#"{"provider": "calico"}"#).is_err());
    }
}
