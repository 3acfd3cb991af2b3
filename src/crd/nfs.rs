//! CephNFS CRD

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, HostPathVolumeSource,
    PersistentVolumeClaimVolumeSource, ResourceRequirements, SecretVolumeSource,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::ResourceStatus;
use crate::spec::placement::Placement;

// =============================================================================
// CephNFS CRD
// =============================================================================

/// An NFS-Ganesha gateway exporting CephFS or RGW
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephNFS",
    plural = "cephnfses",
    shortname = "nfs",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Active", "type": "string", "jsonPath": ".spec.server.active"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NfsGaneshaSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rados: Option<GaneshaRadosSpec>,

    #[serde(default)]
    pub server: GaneshaServerSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<NfsSecuritySpec>,
}

/// Where recovery state lives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GaneshaRadosSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pool: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GaneshaServerSpec {
    #[serde(default)]
    pub active: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_level: String,

    #[serde(default)]
    pub placement: Placement,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority_class_name: String,
}

// =============================================================================
// Security
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NfsSecuritySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sssd: Option<SssdSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kerberos: Option<KerberosSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SssdSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<SssdSidecar>,
}

/// SSSD run as a sidecar of the gateway pod
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SssdSidecar {
    #[serde(default)]
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sssd_config_file: Option<SidecarConfigFile>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_files: Vec<AdditionalVolumeMount>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default)]
    pub debug_level: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SidecarConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_source: Option<ConfigurableVolumeSource>,
}

/// Extra files mounted under a sub-path of the sidecar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalVolumeMount {
    pub sub_path: String,
    #[serde(default)]
    pub volume_source: ConfigurableVolumeSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KerberosSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub principal_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain_name: String,

    #[serde(default)]
    pub config_files: KerberosConfigFiles,

    #[serde(default)]
    pub keytab_file: KerberosKeytabFile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KerberosConfigFiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_source: Option<ConfigurableVolumeSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KerberosKeytabFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_source: Option<ConfigurableVolumeSource>,
}

/// The volume kinds a user may mount config from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurableVolumeSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,
}

impl ConfigurableVolumeSource {
    pub fn is_empty(&self) -> bool {
        self.host_path.is_none()
            && self.empty_dir.is_none()
            && self.secret.is_none()
            && self.persistent_volume_claim.is_none()
            && self.config_map.is_none()
    }
}

impl NfsSecuritySpec {
    pub fn sssd_sidecar(&self) -> Option<&SssdSidecar> {
        self.sssd.as_ref()?.sidecar.as_ref()
    }
}
