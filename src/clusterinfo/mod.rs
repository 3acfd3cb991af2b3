//! Cluster-info store
//!
//! Identity (fsid, monitor secret, admin credentials) lives in the
//! `rook-ceph-mon` secret; monitor endpoints, the schedule mapping, the
//! out-of-quorum list and the highest monitor ID live in the
//! `rook-ceph-mon-endpoints` config map. Both carry the disaster-protection
//! finalizer and are owned by the `CephCluster`.
//!
//! A `ClusterInfo` is built per reconcile and never shared across clusters.

pub mod bootstrap;
pub mod endpoints;

pub use bootstrap::*;
pub use endpoints::*;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::spec::NetworkSpec;

/// Identity secret name, also the monitor app label
pub const MON_SECRET_NAME: &str = "rook-ceph-mon";

/// Endpoint config map name
pub const ENDPOINT_CONFIGMAP_NAME: &str = "rook-ceph-mon-endpoints";

/// Finalizer guarding the identity secret and endpoint config map
pub const DISASTER_PROTECTION_FINALIZER: &str = "rook.io/disaster-protection";

/// Canonical admin user minted for new clusters
pub const CEPH_ADMIN_USERNAME: &str = "client.admin";

/// Secret type used for operator-owned secrets
pub const ROOK_SECRET_TYPE: &str = "kubernetes.io/rook";

/// Wait between attempts to load an external cluster's identity
pub const EXTERNAL_CONNECTION_RETRY: Duration = Duration::from_secs(60);

// Identity secret keys
pub const FSID_KEY: &str = "fsid";
pub const MON_SECRET_KEY: &str = "mon-secret";
pub const CEPH_USERNAME_KEY: &str = "ceph-username";
pub const CEPH_SECRET_KEY: &str = "ceph-secret";
pub const LEGACY_ADMIN_SECRET_KEY: &str = "admin-secret";

// Endpoint config map keys
pub const ENDPOINT_DATA_KEY: &str = "data";
pub const EXTERNAL_MONS_KEY: &str = "externalMons";
pub const OUT_OF_QUORUM_KEY: &str = "outOfQuorum";
pub const MAX_MON_ID_KEY: &str = "maxMonId";
pub const MAPPING_KEY: &str = "mapping";

/// Username and secret used to talk to the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CephCred {
    pub username: String,
    pub secret: String,
}

/// One monitor endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonInfo {
    pub name: String,
    /// `host:port`
    pub endpoint: String,
    pub out_of_quorum: bool,
}

impl MonInfo {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            out_of_quorum: false,
        }
    }
}

/// Where a monitor is scheduled
///
/// Field names are capitalized on the wire, except `zone`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonScheduleInfo {
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "Hostname", default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(rename = "Address", default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
}

/// Monitor slot to node (or zone) assignment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Keyed by monitor slot; named `node` for compatibility even when slots are zones
    #[serde(rename = "node", default)]
    pub schedule: BTreeMap<String, MonScheduleInfo>,
}

/// Everything needed to connect to and manage one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInfo {
    pub namespace: String,
    pub fsid: String,
    pub monitor_secret: String,
    pub ceph_cred: CephCred,
    /// Monitors run by this operator
    pub monitors: BTreeMap<String, MonInfo>,
    /// Monitors of an external cluster
    pub external_mons: BTreeMap<String, MonInfo>,
    /// Highest monitor index ever assigned, -1 when none
    pub max_mon_id: i32,
    pub mapping: Mapping,
    /// Network spec observed when the info was loaded
    pub network: NetworkSpec,
    pub owner: Option<OwnerReference>,
}

impl ClusterInfo {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            fsid: String::new(),
            monitor_secret: String::new(),
            ceph_cred: CephCred::default(),
            monitors: BTreeMap::new(),
            external_mons: BTreeMap::new(),
            max_mon_id: -1,
            mapping: Mapping::default(),
            network: NetworkSpec::default(),
            owner: None,
        }
    }

    /// Identity and credentials are present
    pub fn is_initialized(&self) -> bool {
        !self.fsid.is_empty()
            && !self.monitor_secret.is_empty()
            && !self.ceph_cred.username.is_empty()
            && !self.ceph_cred.secret.is_empty()
    }

    /// Names of monitors currently out of quorum, sorted
    pub fn out_of_quorum(&self) -> Vec<&str> {
        self.monitors
            .values()
            .filter(|m| m.out_of_quorum)
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Raise the max monitor ID, never lowering it
    pub fn bump_max_mon_id(&mut self, id: i32) {
        self.max_mon_id = self.max_mon_id.max(id);
    }

    /// Flag a monitor in or out of quorum; false if the monitor is unknown
    pub fn set_out_of_quorum(&mut self, name: &str, out: bool) -> bool {
        match self.monitors.get_mut(name) {
            Some(m) => {
                m.out_of_quorum = out;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_wire_names() {
        let json = r#"{"node":{"a":{"Name":"node1","Hostname":"node1.local","Address":"10.0.0.1","zone":"z1"}}}"#;
        let mapping: Mapping = serde_json::from_str(json).unwrap();
        let a = &mapping.schedule["a"];
        assert_eq!(a.name, "node1");
        assert_eq!(a.address, "10.0.0.1");
        assert_eq!(a.zone, "z1");
        assert_eq!(serde_json::to_string(&mapping).unwrap(), json);
    }

    #[test]
    fn test_max_mon_id_never_decreases() {
        let mut info = ClusterInfo::new("rook-ceph");
        assert_eq!(info.max_mon_id, -1);
        info.bump_max_mon_id(3);
        info.bump_max_mon_id(1);
        assert_eq!(info.max_mon_id, 3);
    }

    #[test]
    fn test_out_of_quorum_tracking() {
        let mut info = ClusterInfo::new("rook-ceph");
        info.monitors.insert("a".into(), MonInfo::new("a", "10.0.0.1:6789"));
        info.monitors.insert("b".into(), MonInfo::new("b", "10.0.0.2:6789"));
        assert!(info.set_out_of_quorum("b", true));
        assert!(!info.set_out_of_quorum("zz", true));
        assert_eq!(info.out_of_quorum(), vec!["b"]);
    }
}
