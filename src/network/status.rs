//! Network-status annotation and `ip --json address` parsing

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::cidr::Cidr;
use crate::error::{Error, Result};

/// Pod annotation where the CNI meta-plugin reports attached networks
pub const NETWORK_STATUS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/network-status";

/// One attached network as reported by the CNI meta-plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub mac: String,
}

/// One interface from `ip --json address show`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddrResult {
    #[serde(rename = "ifname", default)]
    pub interface_name: String,
    #[serde(default)]
    pub addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddrInfo {
    #[serde(default)]
    pub local: String,
    #[serde(rename = "prefixlen", default)]
    pub prefix_len: u8,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Parse the network-status annotation
///
/// The annotation is a JSON list; a lone object is read as a list of one.
pub fn parse_network_status(raw: &str) -> Result<Vec<NetworkStatus>> {
    let parsed: OneOrMany<NetworkStatus> = serde_json::from_str(raw.trim())
        .map_err(|e| Error::NetworkParse(format!("failed to parse network status: {}", e)))?;
    Ok(match parsed {
        OneOrMany::Many(list) => list,
        OneOrMany::One(one) => vec![one],
    })
}

pub fn find_network_status_by_interface<'a>(
    statuses: &'a [NetworkStatus],
    interface: &str,
) -> Option<&'a NetworkStatus> {
    statuses.iter().find(|s| s.interface == interface)
}

/// Parse `ip --json address show` output
pub fn parse_ip_addr_output(raw: &str) -> Result<Vec<IpAddrResult>> {
    serde_json::from_str(raw.trim())
        .map_err(|e| Error::NetworkParse(format!("failed to parse ip address output: {}", e)))
}

/// Reduced CIDR of the address entry whose `local` is `ip`
pub fn cidr_for_ip(infos: &[IpAddrInfo], ip: &str) -> Result<Cidr> {
    let info = infos
        .iter()
        .find(|i| i.local == ip)
        .ok_or_else(|| Error::NetworkParse(format!("no info for ip {:?}", ip)))?;
    let addr: IpAddr = info.local.parse().map_err(|e| {
        Error::NetworkParse(format!("failed to parse ip {:?}: {}", info.local, e))
    })?;
    Ok(Cidr::new(addr, info.prefix_len)?.network())
}

/// Reduced CIDRs for every IP the CNI reports on the interface
///
/// Both observations must describe the same interface.
pub fn cross_reference(status: &NetworkStatus, iface: &IpAddrResult) -> Result<Vec<Cidr>> {
    if status.interface != iface.interface_name {
        return Err(Error::NetworkParse(format!(
            "network status and internal ip interfaces do not match: {:?} != {:?}",
            status.interface, iface.interface_name
        )));
    }
    status
        .ips
        .iter()
        .map(|ip| {
            cidr_for_ip(&iface.addr_info, ip).map_err(|e| {
                Error::NetworkParse(format!("failed getting CIDR for IP {:?}: {}", ip, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const STATUS: &str = r#"[
        {"name":"cbr0","interface":"eth0","ips":["10.244.0.7"],"mac":"aa","default":true,"dns":{}},
        {"name":"rook-ceph/public-net","interface":"public","ips":["10.144.1.5","fd00:10:144::5"],"mac":"bb","dns":{}}
    ]"#;

    const IP: &str = r#"[{"ifindex":3,"ifname":"public","flags":["UP"],"mtu":1500,
        "addr_info":[
            {"family":"inet","local":"10.144.1.5","prefixlen":16,"scope":"global"},
            {"family":"inet6","local":"fd00:10:144::5","prefixlen":64,"scope":"global"},
            {"family":"inet6","local":"fe80::1","prefixlen":64,"scope":"link"}
        ]}]"#;

    #[test]
    fn test_parse_and_cross_reference() {
        let statuses = parse_network_status(STATUS).unwrap();
        let public = find_network_status_by_interface(&statuses, "public").unwrap();
        let ifaces = parse_ip_addr_output(IP).unwrap();
        assert_eq!(ifaces.len(), 1);

        let cidrs: Vec<String> = cross_reference(public, &ifaces[0])
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(cidrs, vec!["10.144.0.0/16", "fd00:10:144::/64"]);
    }

    #[test]
    fn test_single_object_status() {
        let statuses =
            parse_network_status(r#"{"interface":"public","ips":["10.144.1.5"]}"#).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].ips, vec!["10.144.1.5"]);
    }

    #[test]
    fn test_cross_reference_failures() {
        let status = NetworkStatus {
            interface: "public".into(),
            ips: vec!["10.144.1.9".into()],
            ..Default::default()
        };
        let ifaces = parse_ip_addr_output(IP).unwrap();
        assert_matches!(cross_reference(&status, &ifaces[0]), Err(Error::NetworkParse(_)));

        let other = IpAddrResult {
            interface_name: "cluster".into(),
            addr_info: vec![],
        };
        let err = cross_reference(&status, &other).unwrap_err();
        assert!(err.to_string().contains("do not match"));

        assert_matches!(parse_network_status("not json"), Err(Error::NetworkParse(_)));
    }
}
