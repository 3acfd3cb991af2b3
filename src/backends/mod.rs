//! Port adapters
//!
//! - `k8s`: Kubernetes API client, job runner
//! - `config_db`: cluster settings kept in a config map
//! - `authtool`: key generation through `ceph-authtool`
//! - `memory`: in-memory variants for tests

pub mod authtool;
pub mod config_db;
pub mod k8s;
pub mod memory;

pub use authtool::{extract_key, AuthtoolKeyGenerator};
pub use config_db::{ConfigMapConfigStore, CONFIG_DB_NAME};
pub use k8s::{KubeJobRunner, KubeResourceClient};
pub use memory::{MemoryConfigStore, MemoryResourceClient, ScriptedJobRunner, StaticKeyGenerator};
