//! Multisite CRDs: CephObjectRealm, CephObjectZoneGroup, CephObjectZone

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::ResourceStatus;
use super::pool::PoolSpec;

/// Top of the multisite hierarchy
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephObjectRealm",
    plural = "cephobjectrealms",
    status = "ResourceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRealmSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullSpec>,
}

/// Realm to pull from a remote cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PullSpec {
    #[serde(default)]
    pub endpoint: String,
}

/// A group of zones within a realm
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephObjectZoneGroup",
    plural = "cephobjectzonegroups",
    status = "ResourceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectZoneGroupSpec {
    #[serde(default)]
    pub realm: String,
}

/// A zone backed by its own pools
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephObjectZone",
    plural = "cephobjectzones",
    status = "ResourceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectZoneSpec {
    #[serde(default)]
    pub zone_group: String,

    #[serde(default)]
    pub metadata_pool: PoolSpec,

    #[serde(default)]
    pub data_pool: PoolSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_endpoints: Vec<String>,

    #[serde(default)]
    pub preserve_pools_on_delete: bool,
}
