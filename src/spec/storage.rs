//! Storage selection spec and node resolution

use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, ResourceRequirements};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::placement::Placement;

/// Supported OSD backend stores
pub const OSD_STORE_BLUESTORE: &str = "bluestore";
pub const OSD_STORE_BLUESTORE_RDR: &str = "bluestore-rdr";

// =============================================================================
// Types
// =============================================================================

/// Cluster-wide storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageScopeSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_all_nodes: Option<bool>,

    /// Free-form OSD configuration inherited by every node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,

    #[serde(flatten)]
    pub selection: Selection,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_class_device_sets: Vec<StorageClassDeviceSet>,

    #[serde(default)]
    pub store: OsdStore,
}

/// Device selection settings, available at cluster and node level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_all_devices: Option<bool>,

    /// Regex matched against device names
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_filter: String,

    /// Regex matched against device paths
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_path_filter: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<Device>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_claim_templates: Vec<VolumeClaimTemplate>,
}

/// An explicitly listed device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// A per-node override
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,

    #[serde(flatten)]
    pub selection: Selection,
}

/// Persistent volume claim template used by mons and OSDs on PVC
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimTemplate {
    #[serde(default)]
    pub metadata: TemplateMeta,
    #[serde(default)]
    pub spec: PersistentVolumeClaimSpec,
}

/// The subset of object metadata a claim template may carry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A set of OSDs backed by a storage class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassDeviceSet {
    pub name: String,

    #[serde(default)]
    pub count: u32,

    #[serde(default)]
    pub portable: bool,

    /// Encrypt the OSDs; cannot change once created
    #[serde(default)]
    pub encrypted: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tune_device_class: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,

    #[serde(default)]
    pub volume_claim_templates: Vec<VolumeClaimTemplate>,
}

/// OSD backend store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OsdStore {
    /// `bluestore` (default) or `bluestore-rdr`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub update_store: String,
}

// =============================================================================
// Node Resolution
// =============================================================================

impl Selection {
    /// Whether to use all devices; unset means false
    pub fn get_use_all_devices(&self) -> bool {
        self.use_all_devices.unwrap_or(false)
    }

    fn inherit_from(&mut self, cluster: &Selection) {
        if self.use_all_devices.is_none() {
            self.use_all_devices = cluster.use_all_devices;
        }
        if self.device_filter.is_empty() {
            self.device_filter = cluster.device_filter.clone();
        }
        if self.device_path_filter.is_empty() {
            self.device_path_filter = cluster.device_path_filter.clone();
        }
        if self.devices.is_empty() {
            self.devices = cluster.devices.clone();
        }
        if self.volume_claim_templates.is_empty() {
            self.volume_claim_templates = cluster.volume_claim_templates.clone();
        }
    }
}

impl StorageScopeSpec {
    /// Effective settings for `node_name`, or None when the node is not listed
    pub fn resolve_node(&self, node_name: &str) -> Option<Node> {
        let mut node = self.nodes.iter().find(|n| n.name == node_name)?.clone();

        node.selection.inherit_from(&self.selection);
        for (k, v) in &self.config {
            node.config.entry(k.clone()).or_insert_with(|| v.clone());
        }

        Some(node)
    }

    pub fn node_exists(&self, node_name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == node_name)
    }

    /// True if the cluster or any node asks for all devices
    pub fn any_use_all_devices(&self) -> bool {
        self.selection.get_use_all_devices()
            || self.nodes.iter().any(|n| n.selection.get_use_all_devices())
    }

    /// Turn off use-all-devices everywhere
    pub fn clear_use_all_devices(&mut self) {
        let off = Some(false);
        self.selection.use_all_devices = off;
        for node in &mut self.nodes {
            node.selection.use_all_devices = off;
        }
    }

    /// True if any device set runs encrypted OSDs on PVCs
    pub fn is_on_pvc_encrypted(&self) -> bool {
        self.storage_class_device_sets.iter().any(|s| s.encrypted)
    }

    pub fn use_all_nodes(&self) -> bool {
        self.use_all_nodes.unwrap_or(false)
    }
}
