//! Cleanup job factory
//!
//! Resources deleted with `rook.io/force-deletion=true` get a one-shot
//! `ceph clean <Kind>` job. Clusters whose cleanup policy is armed get one
//! privileged `ceph clean host` job pinned to every host that ran a Ceph
//! daemon, started once those daemons are gone. Jobs restart on failure, so
//! the cleanup command must be idempotent.
//!
//! Cleanup jobs carry no owner reference: they outlive the resource whose
//! deletion started them.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, HostPathVolumeSource, PodSpec, PodTemplateSpec,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crd::CephCluster;
use crate::domain::ResourceClient;
use crate::error::{Error, Result};
use crate::spec::{apply_annotations, apply_labels, merge_tolerations, ComponentKey, Placement};

/// Annotation requesting cleanup of a resource's Ceph-side data
pub const FORCE_DELETION_ANNOTATION: &str = "rook.io/force-deletion";

pub const CLEANUP_APP: &str = "rook-ceph-cleanup";

/// Service account the cleanup pods run as
pub const DEFAULT_CLEANUP_SERVICE_ACCOUNT: &str = "rook-ceph-purge-osd";

/// Config map mounted into every cleanup pod
pub const OVERRIDE_CONFIG_MAP: &str = "rook-config-override";

pub const DATA_DIR_HOST_PATH_ENV: &str = "ROOK_DATA_DIR_HOST_PATH";
pub const NAMESPACE_ENV: &str = "POD_NAMESPACE";
pub const LOG_LEVEL_ENV: &str = "ROOK_LOG_LEVEL";
pub const BLOCK_POOL_NAME_ENV: &str = "CEPH_BLOCK_POOL_NAME";
pub const SUBVOLUME_GROUP_NAME_ENV: &str = "CEPH_SUBVOLUME_GROUP_NAME";
pub const SANITIZE_METHOD_ENV: &str = "ROOK_SANITIZE_METHOD";
pub const SANITIZE_DATA_SOURCE_ENV: &str = "ROOK_SANITIZE_DATA_SOURCE";
pub const SANITIZE_ITERATION_ENV: &str = "ROOK_SANITIZE_ITERATION";
pub const NAMESPACE_DIR_ENV: &str = "ROOK_NAMESPACE_DIR";
pub const MON_SECRET_ENV: &str = "ROOK_MON_SECRET";
pub const CLUSTER_FSID_ENV: &str = "ROOK_CLUSTER_FSID";

/// Node label the host cleanup jobs are pinned by
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// `app` labels of the daemons that must be gone before hosts are wiped
pub const CEPH_DAEMON_APPS: [&str; 7] = [
    "rook-ceph-mon",
    "rook-ceph-mgr",
    "rook-ceph-osd",
    "rook-ceph-rgw",
    "rook-ceph-mds",
    "rook-ceph-rbd-mirror",
    "rook-ceph-fs-mirror",
];

/// Interval between checks for remaining Ceph daemons
pub const DAEMON_CLEANUP_POLL: Duration = Duration::from_secs(5);

const DATA_VOLUME: &str = "rook-data";
const DEVICES_VOLUME: &str = "devices";
const DEVICES_DIR: &str = "/dev";
const CONFIG_VOLUME: &str = "rook-config-override";
const CONFIG_DIR: &str = "/etc/rook/config";
const MAX_JOB_NAME_LEN: usize = 63;

/// True when the annotations request a forced cleanup
pub fn force_delete_requested(annotations: &BTreeMap<String, String>) -> bool {
    annotations
        .get(FORCE_DELETION_ANNOTATION)
        .map(|v| v == "true")
        .unwrap_or(false)
}

/// `cleanup-<kind>-<name>`, cut to the job name limit
pub fn cleanup_job_name(kind: &str, name: &str) -> String {
    truncate_name(format!("cleanup-{}-{}", kind.to_lowercase(), name))
}

/// `cluster-cleanup-job-<host>`, cut to the job name limit
pub fn host_cleanup_job_name(host: &str) -> String {
    truncate_name(format!("cluster-cleanup-job-{}", host))
}

fn truncate_name(mut full: String) -> String {
    if full.len() > MAX_JOB_NAME_LEN {
        full.truncate(MAX_JOB_NAME_LEN);
        while full.ends_with('-') {
            full.pop();
        }
    }
    full
}

/// A cleanup job for one resource
#[derive(Debug, Clone)]
pub struct ResourceCleanup {
    kind: String,
    name: String,
    namespace: String,
    /// Argument to `ceph clean`
    target: String,
    job_name: String,
    container: String,
    /// Host the job is pinned to
    node: Option<String>,
    /// Privileged, with the host's `/dev`
    host_devices: bool,
    image: String,
    service_account: String,
    log_level: String,
    data_dir_host_path: String,
    priority_class: String,
    placement: Placement,
    annotations: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
    config: BTreeMap<String, String>,
}

impl ResourceCleanup {
    /// Cleanup for `resource`, a child of `cluster`
    ///
    /// `config` entries become extra environment variables.
    pub fn new<K>(
        resource: &K,
        cluster: &CephCluster,
        image: &str,
        config: BTreeMap<String, String>,
    ) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        let spec = &cluster.spec;
        let kind = K::kind(&()).to_string();
        let name = resource.name_any();
        Self {
            target: kind.clone(),
            job_name: cleanup_job_name(&kind, &name),
            container: "resource-cleanup".to_string(),
            node: None,
            host_devices: false,
            kind,
            name,
            namespace: resource.namespace().unwrap_or_default(),
            image: image.to_string(),
            service_account: DEFAULT_CLEANUP_SERVICE_ACCOUNT.to_string(),
            log_level: "DEBUG".to_string(),
            data_dir_host_path: spec.data_dir_host_path.clone(),
            priority_class: spec.priority_class_names.cleanup(),
            placement: spec.placement.cleanup(),
            annotations: spec.annotations.cleanup(),
            labels: spec.labels.cleanup(),
            config,
        }
    }

    /// Data directory and disk wipe of `host` after `cluster` is deleted
    ///
    /// The job only tolerates taints; every node that ran a daemon must be
    /// reachable.
    pub fn host_cleanup(
        cluster: &CephCluster,
        host: &str,
        image: &str,
        config: BTreeMap<String, String>,
    ) -> Self {
        let mut cleanup = Self::new(cluster, cluster, image, config);
        cleanup.target = "host".to_string();
        cleanup.job_name = host_cleanup_job_name(host);
        cleanup.container = "host-cleanup".to_string();
        cleanup.node = Some(host.to_string());
        cleanup.host_devices = true;
        cleanup.placement = host_cleanup_placement(cluster);
        cleanup
    }

    pub fn with_service_account(mut self, name: impl Into<String>) -> Self {
        self.service_account = name.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn job_name(&self) -> String {
        self.job_name.clone()
    }

    fn env(&self) -> Vec<EnvVar> {
        let var = |name: &str, value: &str| EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        };
        let mut env = vec![
            var(DATA_DIR_HOST_PATH_ENV, &self.data_dir_host_path),
            var(NAMESPACE_ENV, &self.namespace),
            var(LOG_LEVEL_ENV, &self.log_level),
        ];
        env.extend(self.config.iter().map(|(k, v)| var(k, v)));
        env
    }

    /// The job object, not yet submitted
    pub fn build_job(&self) -> Job {
        let mut mounts = vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        }];
        let mut volumes = vec![Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(OVERRIDE_CONFIG_MAP.to_string()),
                optional: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }];
        if !self.data_dir_host_path.is_empty() {
            mounts.push(VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: self.data_dir_host_path.clone(),
                ..Default::default()
            });
            volumes.push(Volume {
                name: DATA_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: self.data_dir_host_path.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        if self.host_devices {
            mounts.push(VolumeMount {
                name: DEVICES_VOLUME.to_string(),
                mount_path: DEVICES_DIR.to_string(),
                ..Default::default()
            });
            volumes.push(Volume {
                name: DEVICES_VOLUME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: DEVICES_DIR.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        let container = Container {
            name: self.container.clone(),
            image: Some(self.image.clone()),
            args: Some(vec!["ceph".into(), "clean".into(), self.target.clone()]),
            env: Some(self.env()),
            volume_mounts: Some(mounts),
            security_context: self.host_devices.then(|| SecurityContext {
                privileged: Some(true),
                run_as_user: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let mut pod = PodSpec {
            service_account_name: Some(self.service_account.clone()),
            restart_policy: Some("OnFailure".to_string()),
            priority_class_name: (!self.priority_class.is_empty())
                .then(|| self.priority_class.clone()),
            node_selector: self
                .node
                .as_ref()
                .map(|host| BTreeMap::from([(HOSTNAME_LABEL.to_string(), host.clone())])),
            containers: vec![container],
            volumes: Some(volumes),
            ..Default::default()
        };
        self.placement.apply_to_pod_spec(&mut pod);

        let labels = BTreeMap::from([
            ("app".to_string(), CLEANUP_APP.to_string()),
            (CLEANUP_APP.to_string(), "true".to_string()),
        ]);
        let mut meta = ObjectMeta {
            name: Some(self.job_name()),
            namespace: Some(self.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        };
        apply_annotations(&self.annotations, &mut meta);
        apply_labels(&self.labels, &mut meta);

        Job {
            metadata: meta,
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(pod),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Submit the job, replacing one of the same name
    pub async fn start(&self, resources: &dyn ResourceClient) -> Result<Job> {
        let job = self.build_job();
        resources.replace_job(&job).await?;
        info!(
            kind = %self.kind,
            name = %self.name,
            namespace = %self.namespace,
            job = %self.job_name,
            node = ?self.node,
            "started cleanup job"
        );
        Ok(job)
    }
}

/// Tolerations of every component, so the job schedules wherever a daemon ran
fn host_cleanup_placement(cluster: &CephCluster) -> Placement {
    let spec = &cluster.spec;
    let mut tolerations = Vec::new();
    for key in [
        ComponentKey::All,
        ComponentKey::Cleanup,
        ComponentKey::Arbiter,
        ComponentKey::Mon,
        ComponentKey::Mgr,
        ComponentKey::Osd,
    ] {
        merge_tolerations(&mut tolerations, &spec.placement.get(key).tolerations);
    }
    for set in &spec.storage.storage_class_device_sets {
        if let Some(p) = &set.placement {
            merge_tolerations(&mut tolerations, &p.tolerations);
        }
    }
    Placement {
        tolerations,
        ..Default::default()
    }
}

// =============================================================================
// Cluster host cleanup
// =============================================================================

/// Hostnames of the nodes running Ceph daemons in `namespace`
pub async fn find_ceph_hosts(resources: &dyn ResourceClient, namespace: &str) -> Result<Vec<String>> {
    let mut nodes = BTreeSet::new();
    let mut counts = Vec::with_capacity(CEPH_DAEMON_APPS.len());
    for app in CEPH_DAEMON_APPS {
        let pods = resources
            .list_pods(namespace, &format!("app={}", app))
            .await?;
        counts.push(format!("{}: {}", app, pods.len()));
        nodes.extend(
            pods.into_iter()
                .filter_map(|p| p.spec.and_then(|s| s.node_name))
                .filter(|n| !n.is_empty()),
        );
    }
    debug!(namespace = %namespace, daemons = %counts.join(", "), "existing ceph daemons");

    let mut hosts = Vec::with_capacity(nodes.len());
    for node in nodes {
        let host = resources
            .get_node(&node)
            .await?
            .and_then(|n| n.metadata.labels)
            .and_then(|mut l| l.remove(HOSTNAME_LABEL))
            .ok_or_else(|| Error::Internal(format!("node {:?} has no {} label", node, HOSTNAME_LABEL)))?;
        hosts.push(host);
    }
    Ok(hosts)
}

/// Wait until no Ceph daemon runs in `namespace`
///
/// Polls every `poll`; false when `cancel` fired first.
pub async fn wait_for_daemon_cleanup(
    resources: &dyn ResourceClient,
    namespace: &str,
    poll: Duration,
    cancel: &CancellationToken,
) -> bool {
    loop {
        match find_ceph_hosts(resources, namespace).await {
            Ok(hosts) if hosts.is_empty() => {
                info!(namespace = %namespace, "all ceph daemons are gone");
                return true;
            }
            Ok(hosts) => debug!(namespace = %namespace, ?hosts, "waiting for ceph daemons to be removed"),
            Err(e) => warn!(namespace = %namespace, error = %e, "failed to list ceph daemons"),
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(namespace = %namespace, "operator shutting down, cluster cleanup not started");
                return false;
            }
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

/// Start one host cleanup job per host once the daemons are gone
///
/// Returns the started jobs; none when cancelled before the daemons left.
pub async fn run_host_cleanup(
    resources: &dyn ResourceClient,
    jobs: Vec<ResourceCleanup>,
    namespace: &str,
    poll: Duration,
    cancel: &CancellationToken,
) -> Vec<Job> {
    if !wait_for_daemon_cleanup(resources, namespace, poll, cancel).await {
        return Vec::new();
    }
    let mut started = Vec::with_capacity(jobs.len());
    for cleanup in jobs {
        match cleanup.start(resources).await {
            Ok(job) => started.push(job),
            Err(e) => warn!(job = %cleanup.job_name, error = %e, "failed to start host cleanup job"),
        }
    }
    started
}
