//! Kubernetes-backed port implementations

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Secret};
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams, PropagationPolicy};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::ports::{JobOutput, JobRunner, ResourceClient};
use crate::error::{Error, Result};

/// Interval between job status polls
pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on waiting for a deleted job to disappear
const JOB_DELETE_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Resource Client
// =============================================================================

/// `ResourceClient` over the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Result<&str> {
    meta.namespace
        .as_deref()
        .ok_or_else(|| Error::Internal("object has no namespace".into()))
}

fn name_of(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Result<&str> {
    meta.name
        .as_deref()
        .ok_or_else(|| Error::Internal("object has no name".into()))
}

/// Translate a 409 into the operator's conflict signal
fn map_write_error(err: kube::Error, kind: &str, name: &str) -> Error {
    match &err {
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            Error::ResourceExists {
                kind: kind.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(resp) if resp.code == 409 => Error::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        _ => Error::Kube(err),
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secrets(namespace).get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret> {
        let name = name_of(&secret.metadata)?;
        self.secrets(namespace_of(&secret.metadata)?)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| map_write_error(e, "Secret", name))
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret> {
        let name = name_of(&secret.metadata)?;
        self.secrets(namespace_of(&secret.metadata)?)
            .replace(name, &PostParams::default(), secret)
            .await
            .map_err(|e| map_write_error(e, "Secret", name))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.config_maps(namespace).get_opt(name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let name = name_of(&config_map.metadata)?;
        self.config_maps(namespace_of(&config_map.metadata)?)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|e| map_write_error(e, "ConfigMap", name))
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<ConfigMap> {
        let name = name_of(&config_map.metadata)?;
        self.config_maps(namespace_of(&config_map.metadata)?)
            .replace(name, &PostParams::default(), config_map)
            .await
            .map_err(|e| map_write_error(e, "ConfigMap", name))
    }

    async fn replace_job(&self, job: &Job) -> Result<()> {
        let namespace = namespace_of(&job.metadata)?;
        let name = name_of(&job.metadata)?;
        let jobs = self.jobs(namespace);

        if jobs.get_opt(name).await?.is_some() {
            info!(job = %name, "removing previous job");
            self.delete_job(namespace, name).await?;
        }

        jobs.create(&PostParams::default(), job)
            .await
            .map_err(|e| map_write_error(e, "Job", name))?;
        debug!(job = %name, "job created");
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        let jobs = self.jobs(namespace);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..Default::default()
        };
        match jobs.delete(name, &params).await {
            Ok(_) => {}
            Err(kube::Error::Api(resp)) if resp.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Foreground deletion returns before the object is gone
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: JOB_POLL_INTERVAL,
            max_elapsed_time: Some(JOB_DELETE_TIMEOUT),
            ..Default::default()
        };
        let jobs = &jobs;
        backoff::future::retry(policy, || async move {
            match jobs.get_opt(name).await {
                Ok(None) => Ok(()),
                Ok(Some(_)) => Err(backoff::Error::transient(Error::Timeout {
                    what: format!("deletion of job {:?}", name),
                    duration: JOB_DELETE_TIMEOUT,
                })),
                Err(e) => Err(backoff::Error::permanent(Error::Kube(e))),
            }
        })
        .await
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes.get_opt(name).await?)
    }
}

// =============================================================================
// Job Runner
// =============================================================================

/// Runs jobs on the cluster and collects the first container's output
pub struct KubeJobRunner {
    client: Client,
    resources: Arc<dyn ResourceClient>,
}

impl KubeJobRunner {
    pub fn new(client: Client, resources: Arc<dyn ResourceClient>) -> Self {
        Self { client, resources }
    }

    async fn wait_for_completion(&self, namespace: &str, name: &str) -> Result<()> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        loop {
            if let Some(job) = jobs.get_opt(name).await? {
                let status = job.status.unwrap_or_default();
                if status.succeeded.unwrap_or(0) > 0 || status.failed.unwrap_or(0) > 0 {
                    return Ok(());
                }
            }
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
        }
    }

    async fn collect_output(&self, namespace: &str, name: &str) -> Result<JobOutput> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(&format!("job-name={}", name)))
            .await?;
        let pod = list.items.into_iter().next().ok_or_else(|| Error::JobFailed {
            job: name.to_string(),
            reason: "no pod found for job".into(),
        })?;
        let pod_name = pod.metadata.name.clone().unwrap_or_default();

        let container = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .map(|c| c.name.clone());
        let exit_code = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|cs| cs.first())
            .and_then(|c| c.state.as_ref())
            .and_then(|s| s.terminated.as_ref())
            .map(|t| t.exit_code)
            .unwrap_or(-1);

        let stdout = pods
            .logs(
                &pod_name,
                &LogParams {
                    container,
                    ..Default::default()
                },
            )
            .await?;
        Ok(JobOutput {
            stdout,
            stderr: String::new(),
            exit_code,
        })
    }
}

#[async_trait]
impl JobRunner for KubeJobRunner {
    async fn run(&self, job: Job, timeout: Duration) -> Result<JobOutput> {
        let namespace = namespace_of(&job.metadata)?.to_string();
        let name = name_of(&job.metadata)?.to_string();

        self.resources.replace_job(&job).await?;
        info!(job = %name, timeout = ?timeout, "waiting for job to complete");

        tokio::time::timeout(timeout, self.wait_for_completion(&namespace, &name))
            .await
            .map_err(|_| {
                warn!(job = %name, "job did not complete in time, leaving it in place");
                Error::Timeout {
                    what: format!("job {:?}", name),
                    duration: timeout,
                }
            })??;

        self.collect_output(&namespace, &name).await
    }
}
