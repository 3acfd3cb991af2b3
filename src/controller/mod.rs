//! Controllers
//!
//! - `finalizer`: self and named finalizers with optimistic updates
//! - `owner`: owner-reference matching and construction
//! - `predicate`: which watch events trigger a reconcile
//! - `mapper`: secondary objects to parent reconcile requests
//! - `cleanup`: one-shot `ceph clean` jobs
//! - `resource`: capabilities shared by every resource kind
//! - `cluster`: the `CephCluster` reconciler

pub mod cleanup;
pub mod cluster;
pub mod finalizer;
pub mod mapper;
pub mod owner;
pub mod predicate;
pub mod resource;

pub use cleanup::*;
pub use cluster::*;
pub use finalizer::*;
pub use mapper::*;
pub use owner::*;
pub use predicate::*;
pub use resource::*;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Client;
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backends::ConfigMapConfigStore;
use crate::clusterinfo::{ClusterInfoStore, EXTERNAL_CONNECTION_RETRY};
use crate::domain::{ConfigStore, JobRunner, KeyGenerator, ResourceClient};
use crate::error::{Error, Result};
use crate::network::{NetworkDiscovery, DETECT_NETWORK_CIDR_TIMEOUT};

// =============================================================================
// Operator Configuration
// =============================================================================

/// Process-level settings threaded into every reconcile
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace the operator runs in
    pub operator_namespace: String,
    /// Namespace to watch; None watches all
    pub watch_namespace: Option<String>,
    /// Image for canary and cleanup jobs
    pub image: String,
    pub cleanup_service_account: String,
    /// Force host networking on clusters using the default provider
    pub enforce_host_network: bool,
    pub log_level: String,
    pub external_retry: Duration,
    pub network_discovery_timeout: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            operator_namespace: "rook-ceph".to_string(),
            watch_namespace: None,
            image: "rook/ceph:master".to_string(),
            cleanup_service_account: DEFAULT_CLEANUP_SERVICE_ACCOUNT.to_string(),
            enforce_host_network: false,
            log_level: "INFO".to_string(),
            external_retry: EXTERNAL_CONNECTION_RETRY,
            network_discovery_timeout: DETECT_NETWORK_CIDR_TIMEOUT,
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Reconcile counters exposed on `/metrics`
#[derive(Clone)]
pub struct Metrics {
    pub reconciles: IntCounterVec,
    pub failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let reconciles = IntCounterVec::new(
            Opts::new("ceph_operator_reconcile_total", "Reconciles by kind and result"),
            &["kind", "result"],
        )
        .map_err(|e| Error::Internal(format!("metrics: {}", e)))?;
        let failures = IntCounterVec::new(
            Opts::new("ceph_operator_reconcile_failures_total", "Failed reconciles by kind"),
            &["kind"],
        )
        .map_err(|e| Error::Internal(format!("metrics: {}", e)))?;
        Ok(Self { reconciles, failures })
    }

    /// Register the counters with a registry
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self.reconciles.clone()))
            .and_then(|_| registry.register(Box::new(self.failures.clone())))
            .map_err(|e| Error::Internal(format!("metrics: {}", e)))
    }

    pub fn record(&self, kind: &str, ok: bool) {
        let result = if ok { "success" } else { "error" };
        self.reconciles.with_label_values(&[kind, result]).inc();
        if !ok {
            self.failures.with_label_values(&[kind]).inc();
        }
    }
}

// =============================================================================
// Controller Context
// =============================================================================

/// The ports a reconcile talks through
#[derive(Clone)]
pub struct ClusterServices {
    pub resources: Arc<dyn ResourceClient>,
    pub keys: Arc<dyn KeyGenerator>,
    pub jobs: Arc<dyn JobRunner>,
}

impl ClusterServices {
    pub fn new(
        resources: Arc<dyn ResourceClient>,
        keys: Arc<dyn KeyGenerator>,
        jobs: Arc<dyn JobRunner>,
    ) -> Self {
        Self { resources, keys, jobs }
    }

    pub fn cluster_info_store(&self, config: &OperatorConfig) -> ClusterInfoStore {
        ClusterInfoStore::new(self.resources.clone(), self.keys.clone())
            .with_external_retry(config.external_retry)
    }

    /// Configuration store of one cluster
    pub fn config_store(&self, namespace: &str, owner: Option<OwnerReference>) -> Arc<dyn ConfigStore> {
        Arc::new(ConfigMapConfigStore::new(self.resources.clone(), namespace, owner))
    }

    pub fn network_discovery(
        &self,
        config: &OperatorConfig,
        namespace: &str,
        owner: Option<OwnerReference>,
    ) -> NetworkDiscovery {
        NetworkDiscovery::new(
            self.jobs.clone(),
            self.config_store(namespace, owner),
            config.image.clone(),
        )
        .with_timeout(config.network_discovery_timeout)
    }
}

/// Shared state of the running controllers
pub struct ControllerContext {
    pub client: Client,
    pub config: OperatorConfig,
    pub services: ClusterServices,
    pub metrics: Metrics,
    /// Fires on operator shutdown; long waits inside a reconcile observe it
    pub shutdown: CancellationToken,
}

impl ControllerContext {
    pub fn new(
        client: Client,
        config: OperatorConfig,
        services: ClusterServices,
        metrics: Metrics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            config,
            services,
            metrics,
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record() {
        let metrics = Metrics::new().unwrap();
        let registry = Registry::new();
        metrics.register(&registry).unwrap();
        metrics.record("CephCluster", true);
        metrics.record("CephCluster", false);
        metrics.record("CephCluster", false);
        assert_eq!(
            metrics.reconciles.with_label_values(&["CephCluster", "error"]).get(),
            2
        );
        assert_eq!(metrics.failures.with_label_values(&["CephCluster"]).get(), 2);
        assert_eq!(registry.gather().len(), 2);
        assert!(metrics.register(&registry).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = OperatorConfig::default();
        assert_eq!(config.network_discovery_timeout, Duration::from_secs(15 * 60));
        assert_eq!(config.external_retry, Duration::from_secs(60));
        assert!(!config.enforce_host_network);
    }
}
