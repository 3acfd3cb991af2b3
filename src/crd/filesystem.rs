//! CephFilesystem, CephFilesystemMirror and CephFilesystemSubVolumeGroup CRDs

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::ResourceStatus;
use super::pool::PoolSpec;
use crate::spec::keyed::ProbeSpec;
use crate::spec::placement::Placement;

/// Most active metadata servers a filesystem may run
pub const MAX_ACTIVE_MDS: i32 = 50;

// =============================================================================
// CephFilesystem CRD
// =============================================================================

/// A shared filesystem
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephFilesystem",
    plural = "cephfilesystems",
    shortname = "cephfs",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "ActiveMDS", "type": "string", "jsonPath": ".spec.metadataServer.activeCount"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemSpec {
    #[serde(default)]
    pub metadata_pool: PoolSpec,

    #[serde(default)]
    pub data_pools: Vec<NamedPoolSpec>,

    #[serde(default)]
    pub preserve_pools_on_delete: bool,

    #[serde(default)]
    pub preserve_filesystem_on_delete: bool,

    #[serde(default)]
    pub metadata_server: MetadataServerSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirroring: Option<FsMirroringSpec>,
}

/// A data pool with an optional name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamedPoolSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(flatten)]
    pub pool: PoolSpec,
}

/// Metadata server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetadataServerSpec {
    #[serde(default = "default_active_count")]
    pub active_count: i32,
    #[serde(default)]
    pub active_standby: bool,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority_class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<ProbeSpec>,
}

impl Default for MetadataServerSpec {
    fn default() -> Self {
        Self {
            active_count: default_active_count(),
            active_standby: false,
            placement: Placement::default(),
            priority_class_name: String::new(),
            liveness_probe: None,
        }
    }
}

fn default_active_count() -> i32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FsMirroringSpec {
    #[serde(default)]
    pub enabled: bool,
}

// =============================================================================
// CephFilesystemMirror CRD
// =============================================================================

/// cephfs-mirror daemon
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephFilesystemMirror",
    plural = "cephfilesystemmirrors",
    status = "ResourceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemMirroringSpec {
    #[serde(default)]
    pub placement: Placement,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority_class_name: String,
}

// =============================================================================
// CephFilesystemSubVolumeGroup CRD
// =============================================================================

/// A subvolume group inside a filesystem
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephFilesystemSubVolumeGroup",
    plural = "cephfilesystemsubvolumegroups",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Filesystem", "type": "string", "jsonPath": ".spec.filesystemName"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SubVolumeGroupSpec {
    /// Name of the owning CephFilesystem
    #[serde(default)]
    pub filesystem_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Pin the group to an MDS rank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinning: Option<SubVolumeGroupPinning>,
}

/// At most one pinning mode may be set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubVolumeGroupPinning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributed: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let spec: FilesystemSpec = serde_json::from_value(serde_json::json!({
            "metadataPool": {"replicated": {"size": 3}},
            "dataPools": [{"name": "replicated", "replicated": {"size": 3}}]
        }))
        .unwrap();
        assert_eq!(spec.metadata_server.active_count, 1);
        assert_eq!(spec.data_pools[0].name, "replicated");
        assert!(spec.data_pools[0].pool.is_replicated());
    }
}
