//! CephCluster reconciler
//!
//! One reconcile per cluster at a time (the controller runtime serializes
//! reconciles per object). A reconcile:
//!
//! 1. refuses a second cluster in the same namespace (phase `Ignored`)
//! 2. ensures the self finalizer
//! 3. validates the spec
//! 4. loads or mints the cluster info, or waits for an external cluster's
//! 5. applies the public/cluster network settings
//! 6. records the outcome on the status
//!
//! Deletion is blocked while dependent resources exist, unless the cleanup
//! policy is armed. Then the hosts running Ceph daemons are recorded, a
//! background task waits for those daemons to go and starts one cleanup job
//! per host, and the finalizer is dropped right away.

use chrono::Utc;
use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ListParams};
use kube::runtime::controller::Action;
use kube::runtime::{reflector, watcher, Controller, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::cleanup::*;
use super::finalizer::{add_finalizer, finalizer_name, has_finalizer, remove_finalizer};
use super::mapper::map_secret_to_clusters;
use super::owner::{cluster_owner_ref, OwnerMatcher};
use super::predicate::*;
use super::resource::CephResource;
use super::{ClusterServices, ControllerContext, OperatorConfig};
use crate::clusterinfo::ClusterInfo;
use crate::crd::*;
use crate::domain::ResourceClient;
use crate::error::{Error, Result};
use crate::spec::{NetworkProvider, Validate, CLUSTER_NETWORK, PUBLIC_NETWORK};
use crate::status::*;

// =============================================================================
// Reconcile Steps
// =============================================================================

/// Name of an older cluster already managing `cluster`'s namespace
///
/// The oldest live cluster wins; ties break on name.
pub fn find_duplicate(cluster: &CephCluster, others: &[CephCluster]) -> Option<String> {
    let namespace = cluster.namespace();
    // clusters without a creation time sort last
    let rank = |c: &CephCluster| {
        let created = c.metadata.creation_timestamp.as_ref().map(|t| t.0);
        (created.is_none(), created, c.name_any())
    };
    let own = rank(cluster);
    others
        .iter()
        .filter(|o| o.namespace() == namespace)
        .filter(|o| o.metadata.uid != cluster.metadata.uid || o.name_any() != cluster.name_any())
        .filter(|o| o.metadata.deletion_timestamp.is_none())
        .filter(|o| rank(o) < own)
        .min_by_key(|o| rank(o))
        .map(|o| o.name_any())
}

/// Network spec in effect, with operator-enforced host networking applied
pub fn effective_network_spec(spec: &ClusterSpec, config: &OperatorConfig) -> ClusterSpec {
    let mut spec = spec.clone();
    if spec.network.is_host_enforced(config.enforce_host_network) && !spec.network.is_host() {
        spec.network.provider = NetworkProvider::Host;
    }
    spec
}

/// Load the cluster identity and apply network settings
///
/// External clusters wait for their identity until `cancel` fires. A
/// cancelled network discovery is reported like a failed one and leaves any
/// canary job in place.
pub async fn configure_cluster(
    services: &ClusterServices,
    config: &OperatorConfig,
    cluster: &CephCluster,
    owner: &OwnerReference,
    cancel: &CancellationToken,
) -> Result<ClusterInfo> {
    let namespace = cluster.namespace().unwrap_or_default();
    let spec = effective_network_spec(&cluster.spec, config);
    let store = services.cluster_info_store(config);

    let mut info = if spec.is_external() {
        store
            .populate_external_cluster_info(&namespace, owner, cancel)
            .await?
    } else {
        let info = store.create_or_load(&namespace, Some(owner)).await?;
        store.save_mon_endpoints(&info).await?;
        info
    };
    info.network = spec.network.clone();

    let discovery = services.network_discovery(config, &namespace, Some(owner.clone()));
    tokio::select! {
        res = discovery.apply_network_settings(&spec, &info) => res?,
        _ = cancel.cancelled() => {
            return Err(Error::NetworkDiscovery {
                role: format!("{}/{}", PUBLIC_NETWORK, CLUSTER_NETWORK),
                reason: "operator shutting down before discovery finished".into(),
            });
        }
    }
    Ok(info)
}

/// Extra environment of the host cleanup jobs
pub fn cluster_cleanup_config(
    spec: &ClusterSpec,
    namespace: &str,
    mon_secret: &str,
    fsid: &str,
) -> BTreeMap<String, String> {
    let sanitize = &spec.cleanup_policy.sanitize_disks;
    BTreeMap::from([
        (NAMESPACE_DIR_ENV.to_string(), namespace.to_string()),
        (MON_SECRET_ENV.to_string(), mon_secret.to_string()),
        (CLUSTER_FSID_ENV.to_string(), fsid.to_string()),
        (SANITIZE_METHOD_ENV.to_string(), sanitize.method.to_string()),
        (SANITIZE_DATA_SOURCE_ENV.to_string(), sanitize.data_source.to_string()),
        (SANITIZE_ITERATION_ENV.to_string(), sanitize.iteration.to_string()),
    ])
}

/// One host cleanup job per host running a Ceph daemon of `cluster`
///
/// Empty unless the cleanup policy is armed on a local cluster. A cluster
/// whose identity cannot be loaded is not cleaned.
pub async fn cluster_cleanup_jobs(
    services: &ClusterServices,
    config: &OperatorConfig,
    cluster: &CephCluster,
) -> Result<Vec<ResourceCleanup>> {
    let name = cluster.name_any();
    if !cluster.spec.cleanup_policy.has_data_dir_clean_policy() {
        debug!(name = %name, "cleanup policy not armed, leaving host data in place");
        return Ok(Vec::new());
    }
    if cluster.spec.is_external() {
        debug!(name = %name, "external cluster, no host data to clean");
        return Ok(Vec::new());
    }

    let namespace = cluster.namespace().unwrap_or_default();
    let info = match services
        .cluster_info_store(config)
        .create_or_load(&namespace, None)
        .await
    {
        Ok(info) => info,
        Err(e) => {
            warn!(name = %name, error = %e, "failed to load the cluster info, skipping host cleanup");
            return Ok(Vec::new());
        }
    };
    let hosts = find_ceph_hosts(services.resources.as_ref(), &namespace).await?;
    let env = cluster_cleanup_config(&cluster.spec, &namespace, &info.monitor_secret, &info.fsid);
    Ok(hosts
        .iter()
        .map(|host| {
            ResourceCleanup::host_cleanup(cluster, host, &config.image, env.clone())
                .with_service_account(&config.cleanup_service_account)
                .with_log_level(&config.log_level)
        })
        .collect())
}

/// Start the host cleanup jobs once the daemons are gone, in the background
pub fn spawn_cluster_cleanup(
    resources: Arc<dyn ResourceClient>,
    jobs: Vec<ResourceCleanup>,
    namespace: String,
    cancel: CancellationToken,
) -> JoinHandle<Vec<Job>> {
    tokio::spawn(async move {
        run_host_cleanup(resources.as_ref(), jobs, &namespace, DAEMON_CLEANUP_POLL, &cancel).await
    })
}

async fn list_names<K>(client: &Client, namespace: &str) -> Result<Vec<String>>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let list = api.list(&ListParams::default()).await?;
    Ok(list.items.iter().map(|o| o.name_any()).collect())
}

/// Dependents that keep a cluster from being deleted, as `<Kind>: a, b`
async fn find_dependents(client: &Client, namespace: &str) -> Result<Vec<String>> {
    let mut dependents = Vec::new();
    let mut push = |kind: &str, names: Vec<String>| {
        if !names.is_empty() {
            dependents.push(format!("{}: {}", kind, names.join(", ")));
        }
    };
    push("CephBlockPool", list_names::<CephBlockPool>(client, namespace).await?);
    push("CephFilesystem", list_names::<CephFilesystem>(client, namespace).await?);
    push("CephObjectStore", list_names::<CephObjectStore>(client, namespace).await?);
    push("CephNFS", list_names::<CephNFS>(client, namespace).await?);
    push("CephRBDMirror", list_names::<CephRBDMirror>(client, namespace).await?);
    push(
        "CephFilesystemMirror",
        list_names::<CephFilesystemMirror>(client, namespace).await?,
    );
    Ok(dependents)
}

// =============================================================================
// Reconciler
// =============================================================================

/// Reconcile one `CephCluster`
#[instrument(skip(cluster, ctx), fields(name = %cluster.name_any(), namespace = ?cluster.namespace()))]
pub async fn reconcile(cluster: Arc<CephCluster>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = cluster
        .namespace()
        .ok_or_else(|| Error::validation("CephCluster must be namespaced"))?;
    let name = cluster.name_any();
    let api: Api<CephCluster> = Api::namespaced(ctx.client.clone(), &namespace);
    let kind = CephCluster::kind(&()).to_string();

    if cluster.is_deleting() {
        return handle_deletion(&cluster, &api, &ctx).await;
    }

    let mut status = cluster.status.clone().unwrap_or_default();
    let now = Utc::now();
    if cluster.status.is_none() {
        condition_initialize(&mut status, now);
    }

    let others = api.list(&ListParams::default()).await?;
    if let Some(existing) = find_duplicate(&cluster, &others.items) {
        warn!(existing = %existing, "a CephCluster already exists in this namespace, ignoring");
        record_condition(
            &mut status,
            Condition::new(
                ConditionType::Ignored,
                ConditionStatus::True,
                reason::DUPLICATE_CLUSTER,
                format!(
                    "CephCluster {:?} already exists in namespace {:?}, only one is supported",
                    existing, namespace
                ),
            ),
            false,
            now,
        );
        update_status(&api, &name, &status).await?;
        return Ok(Action::await_change());
    }

    add_finalizer(&api, cluster.as_ref(), &finalizer_name(&kind)).await?;

    if let Err(err) = cluster.validate_create() {
        let result = Err(err);
        let action = report_reconcile_result(&kind, &name, &mut status, &result, now);
        update_status(&api, &name, &status).await?;
        ctx.metrics.record(&kind, false);
        return Ok(action);
    }

    let external = cluster.spec.is_external();
    let (r#type, starting) = if external {
        (ConditionType::Connecting, reason::CLUSTER_CONNECTING)
    } else {
        (ConditionType::Progressing, reason::CLUSTER_PROGRESSING)
    };
    record_condition(
        &mut status,
        Condition::new(r#type, ConditionStatus::True, starting, "Configuring the Ceph cluster"),
        false,
        now,
    );
    update_status(&api, &name, &status).await?;

    let owner = cluster_owner_ref(&name, cluster.metadata.uid.as_deref().unwrap_or_default());
    let result = configure_cluster(&ctx.services, &ctx.config, &cluster, &owner, &ctx.shutdown)
        .await
        .map(|info| {
            debug!(fsid = %info.fsid, mons = info.monitors.len(), "cluster info ready");
        });

    let now = Utc::now();
    let action = match &result {
        Ok(()) => {
            let (ready_reason, message) = if external {
                (reason::CLUSTER_CONNECTED, "Cluster connected successfully")
            } else {
                (reason::CLUSTER_CREATED, "Cluster created successfully")
            };
            mark_ready(&mut status, ready_reason, message, now);
            info!("cluster configured");
            Action::await_change()
        }
        Err(_) => report_reconcile_result(&kind, &name, &mut status, &result, now),
    };
    status.observed_generation = cluster.metadata.generation;
    update_status(&api, &name, &status).await?;
    ctx.metrics.record(&kind, result.is_ok());
    Ok(action)
}

async fn handle_deletion(
    cluster: &CephCluster,
    api: &Api<CephCluster>,
    ctx: &ControllerContext,
) -> Result<Action> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    let kind = CephCluster::kind(&()).to_string();
    let finalizer = finalizer_name(&kind);
    if !has_finalizer(&cluster.metadata, &finalizer) {
        return Ok(Action::await_change());
    }

    let mut status = cluster.status.clone().unwrap_or_default();
    let now = Utc::now();
    record_condition(
        &mut status,
        Condition::new(
            ConditionType::Deleting,
            ConditionStatus::True,
            reason::CLUSTER_DELETING,
            "Deleting the CephCluster",
        ),
        true,
        now,
    );

    let armed = cluster.spec.cleanup_policy.has_data_dir_clean_policy();
    if !armed {
        let dependents = find_dependents(&ctx.client, &namespace).await?;
        if !dependents.is_empty() {
            report_deletion_blocked_due_to_dependents(&kind, &name, &mut status, &dependents, now);
            update_status(api, &name, &status).await?;
            return Ok(Action::requeue(REQUEUE_BACKOFF));
        }
    }
    report_deletion_not_blocked(&kind, &name, &mut status, now);
    update_status(api, &name, &status).await?;

    let jobs = cluster_cleanup_jobs(&ctx.services, &ctx.config, cluster).await?;
    if !jobs.is_empty() {
        info!(name = %name, hosts = jobs.len(), "cleaning up hosts once the ceph daemons are gone");
        spawn_cluster_cleanup(
            ctx.services.resources.clone(),
            jobs,
            namespace.clone(),
            ctx.shutdown.clone(),
        );
    }
    remove_finalizer(api, cluster, &finalizer).await?;
    info!(name = %name, namespace = %namespace, "cluster deleted");
    Ok(Action::await_change())
}

/// Requeue policy for reconcile errors
pub fn error_policy(cluster: Arc<CephCluster>, err: &Error, ctx: Arc<ControllerContext>) -> Action {
    warn!(name = %cluster.name_any(), error = %err, "reconcile failed");
    ctx.metrics.record(CephCluster::kind(&()).as_ref(), false);
    error_action(err)
}

// =============================================================================
// Controller
// =============================================================================

/// Run a watcher stream through an event gate
fn gated<K, S>(
    stream: S,
    gate: Arc<EventGate<K>>,
) -> impl Stream<Item = std::result::Result<K, watcher::Error>> + Send + 'static
where
    K: Resource + Clone + Send + Sync + 'static,
    S: Stream<Item = std::result::Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    stream.flat_map(move |event| {
        let items: Vec<std::result::Result<K, watcher::Error>> = match event {
            Ok(event) => gate.filter(event).into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        futures::stream::iter(items)
    })
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Drive the `CephCluster` controller until the shutdown token fires
pub async fn run(ctx: Arc<ControllerContext>) -> Result<()> {
    let client = ctx.client.clone();
    let ns = ctx.config.watch_namespace.as_deref();
    let cfg = watcher::Config::default();

    let (reader, writer) = reflector::store::<CephCluster>();
    let parents = gated(
        watcher(scoped_api::<CephCluster>(&client, ns), cfg.clone())
            .default_backoff()
            .reflect(writer),
        Arc::new(EventGate::new(|e: &WatchEvent<'_, CephCluster>| parent_predicate(e))),
    );

    let matcher = OwnerMatcher::for_kind::<CephCluster>();
    let owned_secrets = {
        let m = matcher.clone();
        gated(
            watcher(scoped_api::<Secret>(&client, ns), cfg.clone()).default_backoff(),
            Arc::new(EventGate::new(move |e: &WatchEvent<'_, Secret>| object_predicate(&m, e))),
        )
    };
    let owned_config_maps = {
        let m = matcher.clone();
        gated(
            watcher(scoped_api::<ConfigMap>(&client, ns), cfg.clone()).default_backoff(),
            Arc::new(EventGate::new(move |e: &WatchEvent<'_, ConfigMap>| object_predicate(&m, e))),
        )
    };
    let owned_deployments = gated(
        watcher(scoped_api::<Deployment>(&client, ns), cfg.clone()).default_backoff(),
        Arc::new(EventGate::new(move |e: &WatchEvent<'_, Deployment>| object_predicate(&matcher, e))),
    );
    let config_secrets = gated(
        watcher(scoped_api::<Secret>(&client, ns), cfg).default_backoff(),
        Arc::new(EventGate::new(|e: &WatchEvent<'_, Secret>| secondary_predicate(e))),
    );

    let store = reader.clone();
    let controller = Controller::for_stream(parents, reader)
        .owns_stream(owned_secrets)
        .owns_stream(owned_config_maps)
        .owns_stream(owned_deployments)
        .watches_stream(config_secrets, move |secret: Secret| {
            map_secret_to_clusters(&secret, &store.state())
        })
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!(cluster = %obj.name, ?action, "reconciled"),
                Err(e) => warn!(error = %e, "controller stream error"),
            }
        });

    info!(namespace = ?ns, "starting CephCluster controller");
    tokio::select! {
        _ = controller => {}
        _ = ctx.shutdown.cancelled() => info!("CephCluster controller shutting down"),
    }
    Ok(())
}
