//! Network canary job
//!
//! A one-shot pod attached to one multus network prints the network-status
//! annotation and `ip --json address show dev <role>` from the same
//! container, separated by a sentinel line. Both are needed: the annotation
//! has the IPs but no prefix lengths, and `ip` also lists addresses the CNI
//! did not assign.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, DownwardAPIVolumeFile, DownwardAPIVolumeSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

use super::status::NETWORK_STATUS_ANNOTATION;
use crate::error::{Error, Result};
use crate::spec::{NetworkSelectionElement, Placement, MULTUS_NETWORKS_ANNOTATION};

/// Separates the two canary payloads
pub const CANARY_SENTINEL: &str =
    "===== k8s.v1.cni.cncf.io/network-status above ===== ip address below =====";

pub const CANARY_APP: &str = "rook-ceph-network-canary";
pub const CANARY_SERVICE_ACCOUNT: &str = "rook-ceph-cmd-reporter";

const STATUS_VOLUME: &str = "network-status";
const STATUS_DIR: &str = "/var/lib/rook/multus";

/// Job name for a role's canary; stable so a stale job gets replaced
pub fn canary_job_name(role: &str) -> String {
    format!("rook-ceph-network-{}-canary", role)
}

/// Inputs for one canary job
#[derive(Debug, Clone)]
pub struct CanaryJobParams<'a> {
    pub role: &'a str,
    pub namespace: &'a str,
    pub image: &'a str,
    pub selection: NetworkSelectionElement,
    pub placement: &'a Placement,
    pub owner: Option<&'a OwnerReference>,
}

/// Build the canary job for a role
///
/// The selection's interface is forced to the role name so the pod's
/// interface can be found by name.
pub fn build_canary_job(params: CanaryJobParams<'_>) -> Result<Job> {
    let mut selection = params.selection;
    selection.interface_request = Some(params.role.to_string());
    let networks = serde_json::to_string(&[selection])?;

    let labels = BTreeMap::from([("app".to_string(), CANARY_APP.to_string())]);
    let mount = VolumeMount {
        name: STATUS_VOLUME.to_string(),
        mount_path: STATUS_DIR.to_string(),
        ..Default::default()
    };

    let wait = Container {
        name: "wait-for-network-status-annotation".to_string(),
        image: Some(params.image.to_string()),
        command: Some(vec![
            "bash".into(),
            "-c".into(),
            format!(
                "set -e\nwhile [ ! -s {dir}/network-status ]; do\n  echo \"waiting for network status\"\n  sleep 2\ndone\ncat {dir}/network-status\necho \"\"\n",
                dir = STATUS_DIR
            ),
        ]),
        volume_mounts: Some(vec![mount.clone()]),
        ..Default::default()
    };

    let report = Container {
        name: "canary".to_string(),
        image: Some(params.image.to_string()),
        command: Some(vec![
            "bash".into(),
            "-c".into(),
            format!(
                "set -e\ncat {dir}/network-status\necho \"\"\necho \"{sentinel}\"\nip --json address show dev {role}\n",
                dir = STATUS_DIR,
                sentinel = CANARY_SENTINEL,
                role = params.role
            ),
        ]),
        volume_mounts: Some(vec![mount]),
        ..Default::default()
    };

    let volume = Volume {
        name: STATUS_VOLUME.to_string(),
        downward_api: Some(DownwardAPIVolumeSource {
            items: Some(vec![DownwardAPIVolumeFile {
                path: "network-status".to_string(),
                field_ref: Some(ObjectFieldSelector {
                    field_path: format!("metadata.annotations['{}']", NETWORK_STATUS_ANNOTATION),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut pod = PodSpec {
        service_account_name: Some(CANARY_SERVICE_ACCOUNT.to_string()),
        restart_policy: Some("Never".to_string()),
        init_containers: Some(vec![wait]),
        containers: vec![report],
        volumes: Some(vec![volume]),
        ..Default::default()
    };
    // osd pods sit on both networks, so their placement reaches both
    params.placement.apply_to_pod_spec(&mut pod);

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(canary_job_name(params.role)),
            namespace: Some(params.namespace.to_string()),
            labels: Some(labels.clone()),
            owner_references: params.owner.map(|o| vec![o.clone()]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(BTreeMap::from([(
                        MULTUS_NETWORKS_ANNOTATION.to_string(),
                        networks,
                    )])),
                    ..Default::default()
                }),
                spec: Some(pod),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Split canary stdout into (network status, ip output)
pub fn split_canary_output(role: &str, stdout: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = stdout.split(CANARY_SENTINEL).collect();
    if parts.len() != 2 {
        // raw output is not echoed back
        return Err(Error::NetworkDiscovery {
            role: role.to_string(),
            reason: format!(
                "canary job did not return two separate outputs (instead {})",
                parts.len()
            ),
        });
    }
    let status = parts[0].trim();
    if status.is_empty() {
        return Err(Error::NetworkDiscovery {
            role: role.to_string(),
            reason: "canary job did not return network status".into(),
        });
    }
    let ip = parts[1].trim();
    if ip.is_empty() {
        return Err(Error::NetworkDiscovery {
            role: role.to_string(),
            reason: "canary job did not return ip address info".into(),
        });
    }
    Ok((status.to_string(), ip.to_string()))
}
