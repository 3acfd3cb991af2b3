//! Shared CRD types
//!
//! Condition and status types carried by every Ceph custom resource, plus
//! small sub-specs reused across kinds.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group of every custom resource managed by the operator
pub const CEPH_GROUP: &str = "ceph.rook.io";

/// API version of every custom resource managed by the operator
pub const CEPH_VERSION: &str = "v1";

// =============================================================================
// Conditions
// =============================================================================

/// Type of a status condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    Ignored,
    Connecting,
    Connected,
    Progressing,
    Ready,
    Updating,
    Failure,
    Upgrading,
    Deleting,
    DeletionIsBlocked,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::Ignored => write!(f, "Ignored"),
            ConditionType::Connecting => write!(f, "Connecting"),
            ConditionType::Connected => write!(f, "Connected"),
            ConditionType::Progressing => write!(f, "Progressing"),
            ConditionType::Ready => write!(f, "Ready"),
            ConditionType::Updating => write!(f, "Updating"),
            ConditionType::Failure => write!(f, "Failure"),
            ConditionType::Upgrading => write!(f, "Upgrading"),
            ConditionType::Deleting => write!(f, "Deleting"),
            ConditionType::DeletionIsBlocked => write!(f, "DeletionIsBlocked"),
        }
    }
}

/// Status of a condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Well-known condition reasons
pub mod reason {
    pub const CLUSTER_CREATED: &str = "ClusterCreated";
    pub const CLUSTER_CONNECTED: &str = "ClusterConnected";
    pub const CLUSTER_PROGRESSING: &str = "ClusterProgressing";
    pub const CLUSTER_DELETING: &str = "ClusterDeleting";
    pub const CLUSTER_CONNECTING: &str = "ClusterConnecting";
    pub const CLUSTER_FAILURE: &str = "ClusterFailure";
    pub const RECONCILE_SUCCEEDED: &str = "ReconcileSucceeded";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
    pub const RECONCILE_STARTED: &str = "ReconcileStarted";
    pub const DELETING: &str = "Deleting";
    pub const OBJECT_HAS_DEPENDENTS: &str = "ObjectHasDependents";
    pub const OBJECT_HAS_NO_DEPENDENTS: &str = "ObjectHasNoDependents";
    pub const POOL_EMPTY: &str = "PoolEmpty";
    pub const POOL_NOT_EMPTY: &str = "PoolNotEmpty";
    pub const PROGRESSING_COMPLETED: &str = "ProgressingCompleted";
    pub const UPDATE_COMPLETED: &str = "UpdateCompleted";
    pub const UPGRADE_COMPLETED: &str = "UpgradeCompleted";
    pub const DUPLICATE_CLUSTER: &str = "ClusterDuplicate";
}

/// A single entry in a resource's condition list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: ConditionType,
    /// Status: True, False, Unknown
    pub status: ConditionStatus,
    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Last time the condition was probed
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_heartbeat_time: Option<DateTime<Utc>>,
    /// Last time the status changed
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Build a condition without timestamps; they are filled in when recorded
    pub fn new(
        r#type: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type,
            status,
            reason: reason.into(),
            message: message.into(),
            last_heartbeat_time: None,
            last_transition_time: None,
        }
    }
}

/// Coarse cluster state kept for older clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ClusterState {
    Creating,
    Created,
    Updating,
    Connecting,
    Connected,
    Error,
    Deleting,
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterState::Creating => write!(f, "Creating"),
            ClusterState::Created => write!(f, "Created"),
            ClusterState::Updating => write!(f, "Updating"),
            ClusterState::Connecting => write!(f, "Connecting"),
            ClusterState::Connected => write!(f, "Connected"),
            ClusterState::Error => write!(f, "Error"),
            ClusterState::Deleting => write!(f, "Deleting"),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status shared by every resource kind other than CephCluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Current phase, mirrors the latest condition type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ConditionType>,

    /// Message of the latest condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions in insertion order
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Generation observed by the last reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Kind-specific details (endpoints, topic ARN, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, String>,
}

// =============================================================================
// Shared Sub-Specs
// =============================================================================

/// Health check settings for a daemon or mirroring status poller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    #[serde(default)]
    pub disabled: bool,
    /// Interval, e.g. "60s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}
