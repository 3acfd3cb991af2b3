//! Ceph network CIDR discovery and application
//!
//! With the multus provider the public and cluster CIDRs are read from a
//! canary pod on each network unless the user gave address ranges. The
//! resulting ranges become the `public_network` and `cluster_network`
//! settings, always written public first.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::canary::{build_canary_job, split_canary_output, CanaryJobParams};
use super::status::{
    cross_reference, find_network_status_by_interface, parse_ip_addr_output, parse_network_status,
};
use crate::clusterinfo::ClusterInfo;
use crate::crd::ClusterSpec;
use crate::domain::ports::{ConfigStore, JobRunner};
use crate::error::{Error, Result};
use crate::spec::{NetworkSpec, Placement, CLUSTER_NETWORK, PUBLIC_NETWORK};

/// Deadline for discovering both networks
pub const DETECT_NETWORK_CIDR_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Runs canaries and writes the network settings
#[derive(Clone)]
pub struct NetworkDiscovery {
    jobs: Arc<dyn JobRunner>,
    config: Arc<dyn ConfigStore>,
    image: String,
    timeout: Duration,
}

impl NetworkDiscovery {
    pub fn new(jobs: Arc<dyn JobRunner>, config: Arc<dyn ConfigStore>, image: impl Into<String>) -> Self {
        Self {
            jobs,
            config,
            image: image.into(),
            timeout: DETECT_NETWORK_CIDR_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply the Ceph network settings for a cluster
    ///
    /// Nothing is applied on the pod network. User address ranges win over
    /// discovery for their role.
    pub async fn apply_network_settings(&self, spec: &ClusterSpec, info: &ClusterInfo) -> Result<()> {
        let net = &spec.network;
        if !net.is_host() && !net.is_multus() {
            info!(namespace = %info.namespace, "not applying network settings on the pod network");
            return Ok(());
        }

        let mut public: Vec<String> = net.address_ranges_for(PUBLIC_NETWORK).to_vec();
        let mut cluster: Vec<String> = net.address_ranges_for(CLUSTER_NETWORK).to_vec();
        let discover_public = public.is_empty();
        let discover_cluster = cluster.is_empty();
        if !discover_public {
            info!(namespace = %info.namespace, "using user-provided public network CIDR(s)");
        }
        if !discover_cluster {
            info!(namespace = %info.namespace, "using user-provided cluster network CIDR(s)");
        }

        if net.is_multus() && (discover_public || discover_cluster) {
            let (found_public, found_cluster) = self
                .discover_address_ranges(spec, info, discover_public, discover_cluster)
                .await?;
            if discover_public {
                public = found_public;
            }
            if discover_cluster {
                cluster = found_cluster;
            }
        }

        set_network_cidrs(self.config.as_ref(), &info.namespace, PUBLIC_NETWORK, &public).await?;
        set_network_cidrs(self.config.as_ref(), &info.namespace, CLUSTER_NETWORK, &cluster).await?;
        Ok(())
    }

    /// Discover both roles in parallel under one deadline
    async fn discover_address_ranges(
        &self,
        spec: &ClusterSpec,
        info: &ClusterInfo,
        discover_public: bool,
        discover_cluster: bool,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let (public_tx, public_rx) = oneshot::channel();
        let (cluster_tx, cluster_rx) = oneshot::channel();
        // dropping the set aborts any canary still running
        let mut tasks = JoinSet::new();
        let mut roles = Vec::new();

        for (role, wanted, tx) in [
            (PUBLIC_NETWORK, discover_public, public_tx),
            (CLUSTER_NETWORK, discover_cluster, cluster_tx),
        ] {
            if !wanted || !spec.network.network_has_selection(role) {
                let _ = tx.send(Ok(Vec::new()));
                continue;
            }
            roles.push(role);
            let this = self.clone();
            let network = spec.network.clone();
            let placement = spec.placement.osd();
            let namespace = info.namespace.clone();
            let owner = info.owner.clone();
            tasks.spawn(async move {
                let result = this
                    .discover_role(role, &network, &placement, &namespace, owner.as_ref())
                    .await;
                let _ = tx.send(result);
            });
        }

        let both = async {
            let public = public_rx
                .await
                .map_err(|_| Error::Internal("public network discovery stopped".into()))?;
            let cluster = cluster_rx
                .await
                .map_err(|_| Error::Internal("cluster network discovery stopped".into()))?;
            Ok::<_, Error>((public, cluster))
        };
        let (public, cluster) = tokio::time::timeout(self.timeout, both)
            .await
            .map_err(|_| Error::NetworkDiscovery {
                role: roles.join("/"),
                reason: format!("timed out after {:?} waiting for the canary pods", self.timeout),
            })??;
        tasks.shutdown().await;

        Ok((public?, cluster?))
    }

    async fn discover_role(
        &self,
        role: &str,
        network: &NetworkSpec,
        placement: &Placement,
        namespace: &str,
        owner: Option<&k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>,
    ) -> Result<Vec<String>> {
        info!(role = %role, namespace = %namespace, "discovering ceph network CIDR(s)");
        let wrap = |reason: String| Error::NetworkDiscovery {
            role: role.to_string(),
            reason,
        };

        let Some(selection) = network
            .get_network_selection(role, namespace)
            .map_err(|e| wrap(format!("failed to get network selection: {}", e)))?
        else {
            return Ok(Vec::new());
        };

        let job = build_canary_job(CanaryJobParams {
            role,
            namespace,
            image: &self.image,
            selection,
            placement,
            owner,
        })?;

        let output = match self.jobs.run(job, self.timeout).await {
            Ok(o) => o,
            Err(e) => return Err(wrap(format!("failed to complete canary job: {}", e))),
        };
        if !output.success() {
            return Err(wrap(format!(
                "canary job returned failure code {}: stderr: {:?}",
                output.exit_code, output.stderr
            )));
        }

        let (raw_status, raw_ip) = split_canary_output(role, &output.stdout)?;
        let statuses = parse_network_status(&raw_status).map_err(|e| wrap(e.to_string()))?;
        let status = find_network_status_by_interface(&statuses, role)
            .ok_or_else(|| wrap("failed to find network status in canary status annotation".into()))?;
        let ifaces = parse_ip_addr_output(&raw_ip).map_err(|e| wrap(e.to_string()))?;
        if ifaces.len() != 1 {
            return Err(wrap(format!(
                "should have only one (found {}) 'ip address' result from canary pod",
                ifaces.len()
            )));
        }

        let cidrs = cross_reference(status, &ifaces[0]).map_err(|e| wrap(e.to_string()))?;
        debug!(role = %role, cidrs = ?cidrs, "discovered network CIDR(s)");
        Ok(cidrs.iter().map(|c| c.to_string()).collect())
    }
}

/// Write `<role>_network` in the global scope; empty lists are not written
pub async fn set_network_cidrs(
    config: &dyn ConfigStore,
    namespace: &str,
    role: &str,
    cidrs: &[String],
) -> Result<()> {
    let value = cidrs.join(",");
    info!(namespace = %namespace, role = %role, cidrs = %value, "ensuring network CIDR(s) are configured");
    if cidrs.is_empty() {
        return Ok(());
    }
    let key = format!("{}_network", role);
    if config.set_if_changed("global", &key, &value).await? {
        info!(namespace = %namespace, role = %role, cidrs = %value, "modified network config");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryConfigStore, ScriptedJobRunner};
    use crate::domain::ports::JobOutput;
    use crate::network::canary::{canary_job_name, CANARY_SENTINEL};
    use crate::spec::{AddressRanges, NetworkProvider};
    use assert_matches::assert_matches;

    fn canary_output(role: &str, ip: &str, prefix: u8) -> JobOutput {
        JobOutput {
            stdout: format!(
                "{{\"interface\":\"{role}\",\"ips\":[\"{ip}\"]}}\n{CANARY_SENTINEL}\n[{{\"ifname\":\"{role}\",\"addr_info\":[{{\"local\":\"{ip}\",\"prefixlen\":{prefix}}}]}}]\n"
            ),
            ..Default::default()
        }
    }

    fn multus_spec(selectors: &[(&str, &str)]) -> ClusterSpec {
        let mut spec = ClusterSpec::default();
        spec.network.provider = NetworkProvider::Multus;
        for (role, sel) in selectors {
            spec.network.selectors.insert(role.to_string(), sel.to_string());
        }
        spec
    }

    fn discovery(runner: ScriptedJobRunner, config: Arc<MemoryConfigStore>) -> NetworkDiscovery {
        NetworkDiscovery::new(Arc::new(runner), config, "rook/ceph:master")
    }

    #[tokio::test]
    async fn test_discovers_and_applies_public_then_cluster() {
        let runner = ScriptedJobRunner::new()
            .with_output(canary_job_name("public"), canary_output("public", "10.144.1.5", 16))
            .with_output(canary_job_name("cluster"), canary_output("cluster", "192.168.20.9", 24));
        let config = Arc::new(MemoryConfigStore::new());
        let spec = multus_spec(&[("public", "public-net"), ("cluster", "rook-ceph/cluster-net")]);

        discovery(runner, config.clone())
            .apply_network_settings(&spec, &ClusterInfo::new("rook-ceph"))
            .await
            .unwrap();

        let writes = config.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], ("global".into(), "public_network".into(), "10.144.0.0/16".into()));
        assert_eq!(writes[1], ("global".into(), "cluster_network".into(), "192.168.20.0/24".into()));
    }

    #[tokio::test]
    async fn test_user_ranges_skip_discovery() {
        let runner = ScriptedJobRunner::new();
        let config = Arc::new(MemoryConfigStore::new());
        let mut spec = multus_spec(&[("public", "public-net")]);
        spec.network.address_ranges = Some(AddressRanges {
            public: vec!["10.10.0.0/16".into()],
            cluster: vec![],
        });

        let d = NetworkDiscovery::new(Arc::new(runner), config.clone(), "img");
        d.apply_network_settings(&spec, &ClusterInfo::new("rook-ceph")).await.unwrap();
        assert_eq!(config.get("global", "public_network").as_deref(), Some("10.10.0.0/16"));
        // no cluster selector, so no cluster write
        assert_eq!(config.get("global", "cluster_network"), None);
    }

    #[tokio::test]
    async fn test_pod_network_applies_nothing() {
        let config = Arc::new(MemoryConfigStore::new());
        let mut spec = ClusterSpec::default();
        spec.network.address_ranges = Some(AddressRanges {
            public: vec!["10.10.0.0/16".into()],
            cluster: vec![],
        });
        discovery(ScriptedJobRunner::new(), config.clone())
            .apply_network_settings(&spec, &ClusterInfo::new("rook-ceph"))
            .await
            .unwrap();
        assert!(config.writes().is_empty());
    }

    #[tokio::test]
    async fn test_host_network_applies_user_ranges() {
        let config = Arc::new(MemoryConfigStore::new());
        let mut spec = ClusterSpec::default();
        spec.network.provider = NetworkProvider::Host;
        spec.network.address_ranges = Some(AddressRanges {
            public: vec![],
            cluster: vec!["172.16.0.0/12".into()],
        });
        discovery(ScriptedJobRunner::new(), config.clone())
            .apply_network_settings(&spec, &ClusterInfo::new("rook-ceph"))
            .await
            .unwrap();
        assert_eq!(config.writes().len(), 1);
        assert_eq!(config.get("global", "cluster_network").as_deref(), Some("172.16.0.0/12"));
    }

    #[tokio::test]
    async fn test_failure_is_wrapped_with_hint() {
        let runner = ScriptedJobRunner::new().with_output(
            canary_job_name("public"),
            JobOutput {
                stdout: String::new(),
                stderr: "ip: can't find device".into(),
                exit_code: 1,
            },
        );
        let config = Arc::new(MemoryConfigStore::new());
        let spec = multus_spec(&[("public", "public-net")]);
        let err = discovery(runner, config.clone())
            .apply_network_settings(&spec, &ClusterInfo::new("rook-ceph"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::NetworkDiscovery { ref role, .. } if role == "public");
        assert!(err.to_string().contains("addressRanges"));
        assert!(config.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_times_out() {
        let runner = ScriptedJobRunner::new()
            .with_output(canary_job_name("public"), canary_output("public", "10.144.1.5", 16))
            .with_delay(Duration::from_secs(3600));
        let config = Arc::new(MemoryConfigStore::new());
        let spec = multus_spec(&[("public", "public-net")]);
        let result = discovery(runner, config)
            .with_timeout(Duration::from_secs(60))
            .apply_network_settings(&spec, &ClusterInfo::new("rook-ceph"))
            .await;
        let err = result.unwrap_err();
        assert_matches!(
            err,
            Error::NetworkDiscovery { ref role, ref reason } if role == "public" && reason.contains("timed out")
        );
        assert!(err.to_string().contains("addressRanges"));
    }
}
