//! Error types for the Ceph operator
//!
//! Provides structured error types for all operator components including
//! spec validation, the cluster-info store, network discovery and the
//! reconcile loops.

use std::time::Duration;
use thiserror::Error;

/// Requeue delay used when the cluster is not ready or a finalizer is blocked
pub const REQUEUE_NOT_READY: Duration = Duration::from_secs(10);

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("conflicting update of {kind} {name:?}, retrying")]
    Conflict { kind: String, name: String },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("{0}")]
    Validation(String),

    #[error("invalid update: {field} cannot be changed. {reason}")]
    ImmutableField { field: String, reason: String },

    // =========================================================================
    // Cluster-Info Errors
    // =========================================================================
    #[error("not expected to create new cluster info and did not find existing secret")]
    NoClusterNoSecret,

    #[error("cannot find credentials in secret {secret:?}")]
    MissingCredentials { secret: String },

    #[error("failed to generate key {name:?}: {reason}")]
    KeyGeneration { name: String, reason: String },

    // =========================================================================
    // Network Discovery Errors
    // =========================================================================
    #[error("failed to discover network CIDRs for multus, please correct any possible errors in the CephCluster spec.network.selectors, or use CephCluster spec.network.addressRanges to manually specify which network ranges to use for public/cluster networks: {role} network: {reason}")]
    NetworkDiscovery { role: String, reason: String },

    #[error("{0}")]
    NetworkParse(String),

    // =========================================================================
    // Job Errors
    // =========================================================================
    #[error("job {job:?} failed: {reason}")]
    JobFailed { job: String, reason: String },

    #[error("timed out after {duration:?} waiting for {what}")]
    Timeout { what: String, duration: Duration },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Build a validation error from any displayable message
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build an immutability error for a field
    pub fn immutable(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ImmutableField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_)
            | Error::Timeout { .. }
            | Error::JobFailed { .. }
            | Error::NetworkDiscovery { .. }
            | Error::NetworkParse(_) => ErrorAction::RequeueWithBackoff,

            // Optimistic concurrency and missing identity - short fixed wait
            Error::Conflict { .. } | Error::NoClusterNoSecret => {
                ErrorAction::RequeueAfter(REQUEUE_NOT_READY)
            }

            // Validation/immutability errors - user must fix the object
            Error::Validation(_)
            | Error::ImmutableField { .. }
            | Error::Configuration(_)
            | Error::Cancelled(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => {
                matches!(resp.code, 404 | 409 | 429 | 500 | 503 | 504)
            }
            Error::Kube(_) | Error::Conflict { .. } | Error::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Check whether the error is a Kubernetes "not found"
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            Error::ResourceNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check whether the error is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409,
            Error::Conflict { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
