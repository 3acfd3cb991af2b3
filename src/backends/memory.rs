//! In-memory port implementations
//!
//! Used by tests and local dry runs. Objects are kept in lock-protected maps
//! and carry a synthetic resource version so optimistic concurrency behaves
//! like the API server.

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::domain::ports::{ConfigStore, JobOutput, JobRunner, KeyGenerator, ResourceClient};
use crate::error::{Error, Result};

type ObjectKey = (String, String);

fn key_of(meta: &ObjectMeta) -> ObjectKey {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

// =============================================================================
// Resource Client
// =============================================================================

/// Secrets, config maps, jobs, pods and nodes held in memory
#[derive(Default)]
pub struct MemoryResourceClient {
    secrets: RwLock<BTreeMap<ObjectKey, Secret>>,
    config_maps: RwLock<BTreeMap<ObjectKey, ConfigMap>>,
    jobs: RwLock<BTreeMap<ObjectKey, Job>>,
    pods: RwLock<BTreeMap<ObjectKey, Pod>>,
    nodes: RwLock<BTreeMap<String, Node>>,
    job_replacements: AtomicUsize,
    version: AtomicU64,
}

impl MemoryResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Snapshot of a stored secret
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Snapshot of a stored config map
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.config_maps
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.jobs
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Every stored job, ordered by namespace and name
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.read().values().cloned().collect()
    }

    pub fn add_pod(&self, pod: Pod) {
        self.pods.write().insert(key_of(&pod.metadata), pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods
            .write()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn add_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.write().insert(name, node);
    }

    /// How many times an existing job was deleted to be recreated
    pub fn job_replacements(&self) -> usize {
        self.job_replacements.load(Ordering::SeqCst)
    }

    fn create<T: Clone>(
        &self,
        store: &RwLock<BTreeMap<ObjectKey, T>>,
        kind: &str,
        meta: impl Fn(&mut T) -> &mut ObjectMeta,
        obj: &T,
    ) -> Result<T> {
        let mut obj = obj.clone();
        let key = key_of(meta(&mut obj));
        let mut map = store.write();
        if map.contains_key(&key) {
            return Err(Error::ResourceExists {
                kind: kind.to_string(),
                name: key.1,
            });
        }
        meta(&mut obj).resource_version = Some(self.next_version());
        map.insert(key, obj.clone());
        Ok(obj)
    }

    fn update<T: Clone>(
        &self,
        store: &RwLock<BTreeMap<ObjectKey, T>>,
        kind: &str,
        meta: impl Fn(&mut T) -> &mut ObjectMeta,
        obj: &T,
    ) -> Result<T> {
        let mut obj = obj.clone();
        let key = key_of(meta(&mut obj));
        let mut map = store.write();
        let Some(current) = map.get_mut(&key) else {
            return Err(Error::ResourceNotFound {
                kind: kind.to_string(),
                name: key.1,
            });
        };
        let expected = meta(&mut obj).resource_version.clone();
        if expected.is_some() && expected != meta(current).resource_version {
            return Err(Error::Conflict {
                kind: kind.to_string(),
                name: key.1,
            });
        }
        meta(&mut obj).resource_version = Some(self.next_version());
        *current = obj.clone();
        Ok(obj)
    }
}

#[async_trait]
impl ResourceClient for MemoryResourceClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secret(namespace, name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        self.create(&self.secrets, "Secret", |s| &mut s.metadata, secret)
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret> {
        self.update(&self.secrets, "Secret", |s| &mut s.metadata, secret)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.config_map(namespace, name))
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        self.create(&self.config_maps, "ConfigMap", |c| &mut c.metadata, config_map)
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        self.update(&self.config_maps, "ConfigMap", |c| &mut c.metadata, config_map)
    }

    async fn replace_job(&self, job: &Job) -> Result<()> {
        let key = key_of(&job.metadata);
        let mut jobs = self.jobs.write();
        if jobs.remove(&key).is_some() {
            self.job_replacements.fetch_add(1, Ordering::SeqCst);
            debug!(job = %key.1, "replaced existing job");
        }
        jobs.insert(key, job.clone());
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        self.jobs
            .write()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let wanted: Vec<(&str, &str)> = label_selector
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.split_once('=').unwrap_or((s, "")))
            .collect();
        Ok(self
            .pods
            .read()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod)
            .filter(|pod| {
                let labels = pod.metadata.labels.as_ref();
                wanted.iter().all(|(k, v)| {
                    labels.and_then(|l| l.get(*k)).map(String::as_str) == Some(*v)
                })
            })
            .cloned()
            .collect())
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.nodes.read().get(name).cloned())
    }
}

// =============================================================================
// Config Store
// =============================================================================

/// Cluster configuration held in memory, with an ordered write log
#[derive(Default)]
pub struct MemoryConfigStore {
    values: DashMap<String, String>,
    writes: Mutex<Vec<(String, String, String)>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: &str, key: &str) -> Option<String> {
        self.values
            .get(&format!("{}.{}", scope, key))
            .map(|v| v.value().clone())
    }

    /// Every effective write as (scope, key, value), oldest first
    pub fn writes(&self) -> Vec<(String, String, String)> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn set_if_changed(&self, scope: &str, key: &str, value: &str) -> Result<bool> {
        let full = format!("{}.{}", scope, key);
        if self.values.get(&full).map_or(false, |v| v.value() == value) {
            return Ok(false);
        }
        self.values.insert(full, value.to_string());
        self.writes
            .lock()
            .push((scope.to_string(), key.to_string(), value.to_string()));
        Ok(true)
    }
}

// =============================================================================
// Key Generator
// =============================================================================

/// Returns the same key every time
pub struct StaticKeyGenerator {
    key: String,
    calls: AtomicUsize,
}

impl StaticKeyGenerator {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyGenerator for StaticKeyGenerator {
    async fn generate_key(&self, _name: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.key.clone())
    }
}

// =============================================================================
// Job Runner
// =============================================================================

/// Answers jobs by name with canned output
#[derive(Default)]
pub struct ScriptedJobRunner {
    outputs: DashMap<String, JobOutput>,
    delay: Option<Duration>,
    ran: Mutex<Vec<Job>>,
}

impl ScriptedJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the job `name` with `output`
    pub fn with_output(self, name: impl Into<String>, output: JobOutput) -> Self {
        self.outputs.insert(name.into(), output);
        self
    }

    /// Sleep before answering, to exercise timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Jobs submitted so far
    pub fn jobs(&self) -> Vec<Job> {
        self.ran.lock().clone()
    }
}

#[async_trait]
impl JobRunner for ScriptedJobRunner {
    async fn run(&self, job: Job, timeout: Duration) -> Result<JobOutput> {
        let name = job.metadata.name.clone().unwrap_or_default();
        self.ran.lock().push(job);

        let answer = async {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outputs
                .get(&name)
                .map(|o| o.value().clone())
                .ok_or_else(|| Error::JobFailed {
                    job: name.clone(),
                    reason: "no scripted output".into(),
                })
        };

        tokio::time::timeout(timeout, answer)
            .await
            .map_err(|_| Error::Timeout {
                what: format!("job {:?}", name),
                duration: timeout,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("ns".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_secret_lifecycle() {
        let client = MemoryResourceClient::new();
        assert!(client.get_secret("ns", "s").await.unwrap().is_none());

        let created = client.create_secret(&secret("s")).await.unwrap();
        assert!(created.metadata.resource_version.is_some());
        assert_matches!(
            client.create_secret(&secret("s")).await,
            Err(Error::ResourceExists { .. })
        );

        let updated = client.update_secret(&created).await.unwrap();
        // stale resource version
        assert_matches!(
            client.update_secret(&created).await,
            Err(Error::Conflict { .. })
        );
        client.update_secret(&updated).await.unwrap();

        assert_matches!(
            client.update_secret(&secret("missing")).await,
            Err(Error::ResourceNotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_config_store_set_if_changed() {
        let store = MemoryConfigStore::new();
        assert!(store.set_if_changed("global", "public_network", "10.0.0.0/24").await.unwrap());
        assert!(!store.set_if_changed("global", "public_network", "10.0.0.0/24").await.unwrap());
        assert!(store.set_if_changed("global", "public_network", "10.1.0.0/24").await.unwrap());
        assert_eq!(store.writes().len(), 2);
        assert_eq!(
            store.get("global", "public_network").as_deref(),
            Some("10.1.0.0/24")
        );
    }

    #[tokio::test]
    async fn test_job_replace() {
        let client = MemoryResourceClient::new();
        let job = Job {
            metadata: ObjectMeta {
                name: Some("cleanup".into()),
                namespace: Some("ns".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        client.replace_job(&job).await.unwrap();
        client.replace_job(&job).await.unwrap();
        assert_eq!(client.job_replacements(), 1);
        client.delete_job("ns", "cleanup").await.unwrap();
        assert!(client.job("ns", "cleanup").is_none());
    }

    #[tokio::test]
    async fn test_list_pods_by_label() {
        let client = MemoryResourceClient::new();
        let pod = |name: &str, ns: &str, app: &str| Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(ns.into()),
                labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        };
        client.add_pod(pod("mon-a", "ns", "rook-ceph-mon"));
        client.add_pod(pod("mgr-a", "ns", "rook-ceph-mgr"));
        client.add_pod(pod("mon-b", "other", "rook-ceph-mon"));

        let mons = client.list_pods("ns", "app=rook-ceph-mon").await.unwrap();
        assert_eq!(mons.len(), 1);
        assert_eq!(mons[0].metadata.name.as_deref(), Some("mon-a"));
        assert_eq!(client.list_pods("ns", "").await.unwrap().len(), 2);

        client.remove_pod("ns", "mon-a");
        assert!(client.list_pods("ns", "app=rook-ceph-mon").await.unwrap().is_empty());
        assert!(client.get_node("node-1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_runner_timeout() {
        let runner = ScriptedJobRunner::new()
            .with_output("a", JobOutput::default())
            .with_delay(Duration::from_secs(60));
        let job = Job {
            metadata: ObjectMeta {
                name: Some("a".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_matches!(
            runner.run(job.clone(), Duration::from_secs(5)).await,
            Err(Error::Timeout { .. })
        );
        assert!(runner.run(job, Duration::from_secs(120)).await.unwrap().success());
        assert_eq!(runner.jobs().len(), 2);
    }
}
