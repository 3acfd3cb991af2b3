//! Ceph Operator - Kubernetes operator core for Ceph storage clusters
//!
//! Reconciles `ceph.rook.io/v1` custom resources: bootstraps cluster identity,
//! discovers public/cluster networks, keeps condition lists and finalizers
//! consistent, and validates resources at admission.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                     Controller runtime (kube::runtime)                    │
//! │   CephCluster watch ── predicates ──┐      owned secrets / config maps    │
//! │                                     ▼      referenced secrets (mappers)   │
//! │                           ┌───────────────────┐                           │
//! │                           │ Cluster reconciler │                          │
//! │                           └─────────┬─────────┘                           │
//! │        ┌────────────────────────────┼───────────────────────────┐         │
//! │        ▼                            ▼                           ▼         │
//! │ ┌──────────────┐          ┌───────────────────┐        ┌──────────────┐   │
//! │ │ Cluster-info │          │ Network discovery │        │ Status and   │   │
//! │ │ store        │          │ (canary jobs)     │        │ finalizers   │   │
//! │ └──────┬───────┘          └─────────┬─────────┘        └──────────────┘   │
//! ├────────┼────────────────────────────┼─────────────────────────────────────┤
//! │        ▼              Ports         ▼                                     │
//! │  ResourceClient   KeyGenerator   JobRunner   ConfigStore                  │
//! ├───────────────────────────────────────────────────────────────────────────┤
//! │  Kubernetes API   ceph-authtool   Jobs + pod logs   rook-ceph-config-db   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`backends`]: Kubernetes, process and in-memory port implementations
//! - [`clusterinfo`]: Cluster identity and monitor endpoints
//! - [`controller`]: Reconciler, finalizers, ownership, predicates, cleanup jobs
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Port traits
//! - [`error`]: Error types and handling
//! - [`network`]: Multus network discovery
//! - [`spec`]: Spec algebra and validation
//! - [`status`]: Condition machine and reconcile reporting
//! - [`webhook`]: Validating admission webhook

pub mod backends;
pub mod clusterinfo;
pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod network;
pub mod spec;
pub mod status;
pub mod webhook;

// Re-export commonly used types
pub use backends::{
    AuthtoolKeyGenerator, ConfigMapConfigStore, KubeJobRunner, KubeResourceClient,
    MemoryConfigStore, MemoryResourceClient, ScriptedJobRunner, StaticKeyGenerator,
};

pub use clusterinfo::{ClusterInfo, ClusterInfoStore, MonInfo};

pub use controller::{
    ClusterServices, ControllerContext, Metrics, OperatorConfig, OwnerMatcher, ResourceCleanup,
    ResourceKind,
};

pub use crd::{all_crds, CephCluster, ClusterSpec, Condition, ConditionStatus, ConditionType};

pub use domain::ports::{ConfigStore, JobOutput, JobRunner, KeyGenerator, ResourceClient};

pub use error::{Error, ErrorAction, Result};

pub use network::NetworkDiscovery;

pub use spec::{NetworkSpec, Validate};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
