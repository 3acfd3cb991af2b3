//! CephBlockPool and CephBlockPoolRadosNamespace CRDs
//!
//! `PoolSpec` is also embedded by filesystems and object stores for their
//! metadata and data pools.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::{HealthCheckSpec, ResourceStatus};

// =============================================================================
// Pool Spec
// =============================================================================

/// Settings of a single RADOS pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// CRUSH failure domain, e.g. host or zone
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_domain: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub crush_root: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_class: String,

    /// One of none, passive, aggressive, force
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub compression_mode: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated: Option<ReplicatedSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erasure_coded: Option<ErasureCodedSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotas: Option<QuotaSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirroring: Option<MirroringSpec>,

    #[serde(default)]
    pub status_check: MirrorHealthCheckSpec,
}

/// Replication settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedSpec {
    pub size: u32,

    #[serde(default)]
    pub require_safe_replica_size: bool,

    #[serde(default)]
    pub replicas_per_failure_domain: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_failure_domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size_ratio: Option<f64>,
}

/// Erasure coding settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErasureCodedSpec {
    pub data_chunks: u32,
    pub coding_chunks: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub algorithm: String,
}

/// Pool quotas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
    /// Human-readable size such as "10Gi"; takes precedence over maxBytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_objects: Option<u64>,
}

/// RBD mirroring of the pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MirroringSpec {
    #[serde(default)]
    pub enabled: bool,
    /// `image` or `pool`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_schedules: Vec<SnapshotScheduleSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotScheduleSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interval: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MirrorHealthCheckSpec {
    #[serde(default)]
    pub mirror: HealthCheckSpec,
}

impl PoolSpec {
    pub fn is_replicated(&self) -> bool {
        self.replicated.as_ref().map_or(false, |r| r.size > 0)
    }

    pub fn is_erasure_coded(&self) -> bool {
        self.erasure_coded
            .as_ref()
            .map_or(false, |ec| ec.data_chunks > 0 || ec.coding_chunks > 0)
    }

    pub fn is_hybrid_store(&self) -> bool {
        self.parameters.contains_key("hybrid_primary_device_class")
    }

    pub fn mirroring_enabled(&self) -> bool {
        self.mirroring.as_ref().map_or(false, |m| m.enabled)
    }
}

// =============================================================================
// CephBlockPool CRD
// =============================================================================

/// A block pool, used by RBD images
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephBlockPool",
    plural = "cephblockpools",
    shortname = "cephbp",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NamedBlockPoolSpec {
    /// Overrides the pool name; defaults to the resource name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(flatten)]
    pub pool: PoolSpec,
}

impl CephBlockPool {
    /// Name of the pool in the cluster
    pub fn pool_name(&self) -> &str {
        if self.spec.name.is_empty() {
            self.metadata.name.as_deref().unwrap_or("")
        } else {
            &self.spec.name
        }
    }
}

// =============================================================================
// CephBlockPoolRadosNamespace CRD
// =============================================================================

/// A RADOS namespace inside a block pool
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephBlockPoolRadosNamespace",
    plural = "cephblockpoolradosnamespaces",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RadosNamespaceSpec {
    /// Name of the owning CephBlockPool
    #[serde(default)]
    pub block_pool_name: String,

    /// Overrides the namespace name; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattened_pool_spec() {
        let spec: NamedBlockPoolSpec = serde_json::from_value(serde_json::json!({
            "failureDomain": "host",
            "replicated": {"size": 3},
            "mirroring": {"enabled": true, "mode": "image"}
        }))
        .unwrap();
        assert_eq!(spec.pool.failure_domain, "host");
        assert!(spec.pool.is_replicated());
        assert!(!spec.pool.is_erasure_coded());
        assert!(spec.pool.mirroring_enabled());
    }

    #[test]
    fn test_pool_name() {
        let mut pool = CephBlockPool::new("replicapool", NamedBlockPoolSpec::default());
        assert_eq!(pool.pool_name(), "replicapool");
        pool.spec.name = ".mgr".into();
        assert_eq!(pool.pool_name(), ".mgr");
    }
}
