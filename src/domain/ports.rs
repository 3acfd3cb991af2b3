//! Domain Ports - Core trait definitions for the Ceph operator
//!
//! These traits define the boundaries between the operator logic and external
//! systems: the Kubernetes API, the key generation helper, the cluster
//! configuration database and one-shot jobs. Adapters in `backends` implement
//! them; tests use the in-memory variants.

use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Key Generation
// =============================================================================

/// Generates Ceph auth keys
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Generate a fresh key; `name` only labels errors and logs
    async fn generate_key(&self, name: &str) -> Result<String>;
}

// =============================================================================
// Kubernetes Resources
// =============================================================================

/// The small slice of the Kubernetes API the cluster-info store and jobs use
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn create_secret(&self, secret: &Secret) -> Result<Secret>;

    async fn update_secret(&self, secret: &Secret) -> Result<Secret>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap>;

    /// Create a job, deleting any job of the same name first
    async fn replace_job(&self, job: &Job) -> Result<()>;

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;

    /// Pods in `namespace` matching a `key=value[,key=value]` selector
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    async fn get_node(&self, name: &str) -> Result<Option<Node>>;
}

// =============================================================================
// Cluster Configuration
// =============================================================================

/// Centralized cluster configuration (`ceph config set`)
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Set `key` in `scope` if the current value differs; true when written
    async fn set_if_changed(&self, scope: &str, key: &str, value: &str) -> Result<bool>;
}

// =============================================================================
// Jobs
// =============================================================================

/// Captured result of a finished job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl JobOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a one-shot job to completion and reports its output
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Replace and run `job`, waiting at most `timeout`
    ///
    /// A timeout leaves the job in place; the next run replaces it.
    async fn run(&self, job: Job, timeout: Duration) -> Result<JobOutput>;
}
