//! CephCluster CRD
//!
//! The root aggregate: one CephCluster describes the monitors, storage,
//! networking and per-component settings of a Ceph cluster in a namespace.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::SecretKeySelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::{ClusterState, Condition, ConditionType};
use crate::spec::keyed::{
    AnnotationsSpec, LabelsSpec, PlacementSpec, PriorityClassNamesSpec, ProbeSpecMap, ResourceSpec,
};
use crate::spec::network::NetworkSpec;
use crate::spec::storage::{StorageScopeSpec, VolumeClaimTemplate};
use crate::spec::value::DriveGroup;

/// Confirmation token that arms destructive cleanup
pub const DELETE_DATA_DIRS_ON_HOSTS_CONFIRMATION: &str = "yes-really-destroy-data";

// =============================================================================
// CephCluster CRD
// =============================================================================

/// CephCluster describes a Ceph cluster managed (or connected to) by the operator
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephCluster",
    plural = "cephclusters",
    shortname = "ceph",
    status = "ClusterStatus",
    printcolumn = r#"{"name": "DataDirHostPath", "type": "string", "jsonPath": ".spec.dataDirHostPath"}"#,
    printcolumn = r#"{"name": "MonCount", "type": "string", "jsonPath": ".spec.mon.count"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Message", "type": "string", "jsonPath": ".status.message"}"#,
    printcolumn = r#"{"name": "Health", "type": "string", "jsonPath": ".status.ceph.health"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub ceph_version: CephVersionSpec,

    /// Host path where config and data are kept; immutable
    #[serde(default)]
    pub data_dir_host_path: String,

    #[serde(default)]
    pub external: ExternalSpec,

    #[serde(default)]
    pub mon: MonSpec,

    #[serde(default)]
    pub mgr: MgrSpec,

    #[serde(default)]
    pub storage: StorageScopeSpec,

    #[serde(default)]
    pub network: NetworkSpec,

    #[serde(default)]
    pub placement: PlacementSpec,

    #[serde(default)]
    pub annotations: AnnotationsSpec,

    #[serde(default)]
    pub labels: LabelsSpec,

    #[serde(default)]
    pub resources: ResourceSpec,

    #[serde(default)]
    pub priority_class_names: PriorityClassNamesSpec,

    #[serde(default)]
    pub health_check: ClusterHealthCheckSpec,

    #[serde(default)]
    pub cleanup_policy: CleanupPolicySpec,

    #[serde(default)]
    pub security: SecuritySpec,

    #[serde(default)]
    pub disruption_management: DisruptionManagementSpec,

    #[serde(default)]
    pub monitoring: MonitoringSpec,

    #[serde(default)]
    pub dashboard: DashboardSpec,

    #[serde(default)]
    pub crash_collector: CrashCollectorSpec,

    #[serde(default)]
    pub log_collector: LogCollectorSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drive_groups: Vec<DriveGroup>,

    /// Config options sourced from secrets: section -> option -> secret key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ceph_config_from_secret: BTreeMap<String, BTreeMap<String, SecretKeySelector>>,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// Ceph container image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephVersionSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub allow_unsupported: bool,
}

/// Connection to an externally managed cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExternalSpec {
    #[serde(default)]
    pub enable: bool,
}

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonSpec {
    /// Desired number of monitors; odd counts are preferred
    #[serde(default = "default_mon_count")]
    pub count: i32,

    #[serde(default)]
    pub allow_multiple_per_node: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stretch_cluster: Option<StretchClusterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<VolumeClaimTemplate>,
}

impl Default for MonSpec {
    fn default() -> Self {
        Self {
            count: default_mon_count(),
            allow_multiple_per_node: false,
            stretch_cluster: None,
            volume_claim_template: None,
        }
    }
}

/// Stretch cluster layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StretchClusterSpec {
    /// Node label identifying the failure domain
    #[serde(default)]
    pub failure_domain_label: String,

    #[serde(default)]
    pub zones: Vec<MonZoneSpec>,
}

/// A zone that hosts monitors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonZoneSpec {
    pub name: String,
    #[serde(default)]
    pub arbiter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_template: Option<VolumeClaimTemplate>,
}

/// Manager settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MgrSpec {
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub allow_multiple_per_node: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<MgrModule>,
}

/// A manager module toggle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MgrModule {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Probe overrides per daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealthCheckSpec {
    #[serde(default)]
    pub liveness_probe: ProbeSpecMap,
    #[serde(default)]
    pub startup_probe: ProbeSpecMap,
}

/// What to do with data when the cluster is deleted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupPolicySpec {
    /// Must be `yes-really-destroy-data` to wipe host data on deletion
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub confirmation: String,

    #[serde(default)]
    pub sanitize_disks: SanitizeDisksSpec,

    #[serde(default)]
    pub allow_uninstall_with_volumes: bool,
}

/// How disks are wiped during cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SanitizeDisksSpec {
    #[serde(default)]
    pub method: SanitizeMethod,
    #[serde(default)]
    pub data_source: SanitizeDataSource,
    #[serde(default = "default_iteration")]
    pub iteration: i32,
}

impl Default for SanitizeDisksSpec {
    fn default() -> Self {
        Self {
            method: SanitizeMethod::default(),
            data_source: SanitizeDataSource::default(),
            iteration: default_iteration(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeMethod {
    Complete,
    #[default]
    Quick,
}

impl std::fmt::Display for SanitizeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SanitizeMethod::Complete => write!(f, "complete"),
            SanitizeMethod::Quick => write!(f, "quick"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeDataSource {
    #[default]
    Zero,
    Random,
}

impl std::fmt::Display for SanitizeDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SanitizeDataSource::Zero => write!(f, "zero"),
            SanitizeDataSource::Random => write!(f, "random"),
        }
    }
}

/// Security settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySpec {
    #[serde(default)]
    pub kms: KeyManagementServiceSpec,
}

/// Key management service used for OSD encryption keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyManagementServiceSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connection_details: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token_secret_name: String,
}

/// Pod disruption budget management
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionManagementSpec {
    #[serde(default)]
    pub manage_pod_budgets: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osd_maintenance_timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_health_check_timeout: Option<i64>,
}

/// Prometheus integration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub metrics_disabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_mgr_endpoints: Vec<String>,
}

/// Manager dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url_prefix: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrashCollectorSpec {
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub days_to_retain: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogCollectorSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub periodicity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_log_size: String,
}

// =============================================================================
// Status
// =============================================================================

/// Status of the CephCluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Coarse legacy state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ClusterState>,

    /// Mirrors the latest condition type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ConditionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceph: Option<CephStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<ClusterVersion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Last observed Ceph health
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephStatus {
    #[serde(default)]
    pub health: String,
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterVersion {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub version: String,
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_mon_count() -> i32 {
    3
}

fn default_iteration() -> i32 {
    1
}

// =============================================================================
// Implementations
// =============================================================================

impl ClusterSpec {
    pub fn is_external(&self) -> bool {
        self.external.enable
    }

    pub fn is_stretch_cluster(&self) -> bool {
        self.mon
            .stretch_cluster
            .as_ref()
            .map(|s| !s.zones.is_empty())
            .unwrap_or(false)
    }

    /// Name of the arbiter zone of a stretch cluster
    pub fn arbiter_zone(&self) -> Option<&str> {
        self.mon
            .stretch_cluster
            .as_ref()?
            .zones
            .iter()
            .find(|z| z.arbiter)
            .map(|z| z.name.as_str())
    }

    pub fn requires_msgr2(&self) -> bool {
        self.network.requires_msgr2()
    }
}

impl CleanupPolicySpec {
    /// Whether host data directories are wiped on deletion
    pub fn has_data_dir_clean_policy(&self) -> bool {
        self.confirmation == DELETE_DATA_DIRS_ON_HOSTS_CONFIRMATION
    }
}

impl KeyManagementServiceSpec {
    const PROVIDER_KEY: &'static str = "KMS_PROVIDER";
    const AUTH_METHOD_KEY: &'static str = "VAULT_AUTH_METHOD";

    pub fn is_enabled(&self) -> bool {
        !self.connection_details.is_empty()
    }

    fn provider(&self) -> &str {
        self.connection_details
            .get(Self::PROVIDER_KEY)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_vault_kms(&self) -> bool {
        self.provider() == "vault"
    }

    pub fn is_ibm_key_protect_kms(&self) -> bool {
        self.provider() == "ibmkeyprotect"
    }

    pub fn is_k8s_auth_enabled(&self) -> bool {
        self.connection_details
            .get(Self::AUTH_METHOD_KEY)
            .map(|m| m == "kubernetes")
            .unwrap_or(false)
            && self.token_secret_name.is_empty()
    }

    pub fn is_token_auth_enabled(&self) -> bool {
        !self.token_secret_name.is_empty()
    }
}

impl CephCluster {
    /// Get the cluster name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("unknown")
    }

    /// Check if the cluster reached the Ready phase
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.phase == Some(ConditionType::Ready))
            .unwrap_or(false)
    }

    /// Names of the secrets referenced by `cephConfigFromSecret`
    pub fn referenced_secrets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .spec
            .ceph_config_from_secret
            .values()
            .flat_map(|opts| opts.values())
            .filter_map(|sel| sel.name.as_deref())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_policy() {
        let mut policy = CleanupPolicySpec::default();
        assert!(!policy.has_data_dir_clean_policy());
        policy.confirmation = "yes".into();
        assert!(!policy.has_data_dir_clean_policy());
        policy.confirmation = DELETE_DATA_DIRS_ON_HOSTS_CONFIRMATION.into();
        assert!(policy.has_data_dir_clean_policy());

        assert_eq!(policy.sanitize_disks.method, SanitizeMethod::Quick);
        assert_eq!(policy.sanitize_disks.data_source, SanitizeDataSource::Zero);
        assert_eq!(policy.sanitize_disks.iteration, 1);
    }

    #[test]
    fn test_kms() {
        let mut kms = KeyManagementServiceSpec::default();
        assert!(!kms.is_enabled());

        kms.connection_details.insert("KMS_PROVIDER".into(), "vault".into());
        kms.connection_details
            .insert("VAULT_AUTH_METHOD".into(), "kubernetes".into());
        assert!(kms.is_enabled());
        assert!(kms.is_vault_kms());
        assert!(!kms.is_ibm_key_protect_kms());
        assert!(kms.is_k8s_auth_enabled());

        kms.token_secret_name = "vault-token".into();
        assert!(!kms.is_k8s_auth_enabled());
        assert!(kms.is_token_auth_enabled());
    }

    #[test]
    fn test_defaults_from_empty_spec() {
        let spec: ClusterSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.mon, MonSpec::default());
        assert_eq!(spec.mon.count, 3);
        assert!(!spec.is_external());
        assert!(!spec.is_stretch_cluster());
    }

    #[test]
    fn test_stretch_arbiter() {
        let mut spec = ClusterSpec::default();
        spec.mon.stretch_cluster = Some(StretchClusterSpec {
            failure_domain_label: "topology.kubernetes.io/zone".into(),
            zones: vec![
                MonZoneSpec {
                    name: "a".into(),
                    arbiter: true,
                    ..Default::default()
                },
                MonZoneSpec {
                    name: "b".into(),
                    ..Default::default()
                },
            ],
        });
        assert!(spec.is_stretch_cluster());
        assert_eq!(spec.arbiter_zone(), Some("a"));
    }

    #[test]
    fn test_referenced_secrets() {
        let mut cluster = CephCluster::new("rook-ceph", ClusterSpec::default());
        let sel = |name: &str| SecretKeySelector {
            name: Some(name.into()),
            key: "value".into(),
            ..Default::default()
        };
        cluster.spec.ceph_config_from_secret = BTreeMap::from([
            (
                "global".to_string(),
                BTreeMap::from([("a".to_string(), sel("s1")), ("b".to_string(), sel("s2"))]),
            ),
            ("osd".to_string(), BTreeMap::from([("c".to_string(), sel("s1"))])),
        ]);
        assert_eq!(cluster.referenced_secrets(), vec!["s1", "s2"]);
    }
}
