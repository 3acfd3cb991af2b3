//! Load-or-create of the cluster identity and endpoint store

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::endpoints::{load_mon_config, mon_config_data};
use super::{
    CephCred, ClusterInfo, CEPH_ADMIN_USERNAME, CEPH_SECRET_KEY, CEPH_USERNAME_KEY,
    DISASTER_PROTECTION_FINALIZER, ENDPOINT_CONFIGMAP_NAME, EXTERNAL_CONNECTION_RETRY, FSID_KEY,
    LEGACY_ADMIN_SECRET_KEY, MON_SECRET_KEY, MON_SECRET_NAME, ROOK_SECRET_TYPE,
};
use crate::domain::ports::{KeyGenerator, ResourceClient};
use crate::error::{Error, Result};

/// Reads and seeds cluster identity through the resource and key ports
pub struct ClusterInfoStore {
    resources: Arc<dyn ResourceClient>,
    keys: Arc<dyn KeyGenerator>,
    external_retry: Duration,
}

impl ClusterInfoStore {
    pub fn new(resources: Arc<dyn ResourceClient>, keys: Arc<dyn KeyGenerator>) -> Self {
        Self {
            resources,
            keys,
            external_retry: EXTERNAL_CONNECTION_RETRY,
        }
    }

    /// Override the wait between external bootstrap attempts
    pub fn with_external_retry(mut self, retry: Duration) -> Self {
        self.external_retry = retry;
        self
    }

    /// Load the cluster info, minting a new identity when allowed
    ///
    /// Without an owner a missing identity secret is `NoClusterNoSecret`.
    pub async fn create_or_load(
        &self,
        namespace: &str,
        owner: Option<&OwnerReference>,
    ) -> Result<ClusterInfo> {
        let mut info = match self.resources.get_secret(namespace, MON_SECRET_NAME).await? {
            Some(secret) => {
                debug!(namespace = %namespace, "found existing monitor secrets");
                self.load_identity(namespace, secret).await?
            }
            None => {
                let Some(owner) = owner else {
                    return Err(Error::NoClusterNoSecret);
                };
                let info = self.create_identity(namespace).await?;
                self.save_identity(&info, owner).await?;
                info
            }
        };

        if let Some(cm) = self
            .resources
            .get_config_map(namespace, ENDPOINT_CONFIGMAP_NAME)
            .await?
        {
            let config = load_mon_config(&cm.data.unwrap_or_default());
            info.monitors = config.monitors;
            info.external_mons = config.external_mons;
            info.max_mon_id = config.max_mon_id;
            info.mapping = config.mapping;
        }
        info.owner = owner.cloned();
        Ok(info)
    }

    /// Wait for an external cluster's identity to be provided
    ///
    /// Retries every `external_retry` until the secret loads or `cancel` fires.
    pub async fn populate_external_cluster_info(
        &self,
        namespace: &str,
        owner: &OwnerReference,
        cancel: &CancellationToken,
    ) -> Result<ClusterInfo> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled("external cluster bootstrap".into()));
            }
            match self.create_or_load(namespace, None).await {
                Ok(mut info) => {
                    info!(
                        namespace = %namespace,
                        user = %info.ceph_cred.username,
                        mons = info.external_mons.len() + info.monitors.len(),
                        "found the cluster info to connect to the external cluster"
                    );
                    info.owner = Some(owner.clone());
                    return Ok(info);
                }
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        retry = ?self.external_retry,
                        "waiting for connection info of the external cluster"
                    );
                    debug!(error = %e, "external cluster info not available");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled("external cluster bootstrap".into()));
                }
                _ = tokio::time::sleep(self.external_retry) => {}
            }
        }
    }

    /// Persist the monitor endpoints, creating the config map if needed
    pub async fn save_mon_endpoints(&self, info: &ClusterInfo) -> Result<()> {
        let data = mon_config_data(info)?;
        match self
            .resources
            .get_config_map(&info.namespace, ENDPOINT_CONFIGMAP_NAME)
            .await?
        {
            Some(mut cm) => {
                if cm.data.as_ref() == Some(&data) {
                    return Ok(());
                }
                cm.data = Some(data);
                self.resources.update_config_map(&cm).await?;
            }
            None => {
                let cm = ConfigMap {
                    metadata: protected_meta(ENDPOINT_CONFIGMAP_NAME, &info.namespace, info.owner.as_ref()),
                    data: Some(data),
                    ..Default::default()
                };
                self.resources.create_config_map(&cm).await?;
            }
        }
        info!(namespace = %info.namespace, mons = info.monitors.len(), "saved mon endpoints");
        Ok(())
    }

    async fn create_identity(&self, namespace: &str) -> Result<ClusterInfo> {
        info!(namespace = %namespace, "creating mon secrets for a new cluster");
        let mut info = ClusterInfo::new(namespace);
        info.fsid = uuid::Uuid::new_v4().to_string();
        info.monitor_secret = self.keys.generate_key("mon.").await?;
        info.ceph_cred = CephCred {
            username: CEPH_ADMIN_USERNAME.to_string(),
            secret: self.keys.generate_key(CEPH_ADMIN_USERNAME).await?,
        };
        Ok(info)
    }

    async fn save_identity(&self, info: &ClusterInfo, owner: &OwnerReference) -> Result<()> {
        let data = BTreeMap::from([
            (FSID_KEY.to_string(), bytes(&info.fsid)),
            (MON_SECRET_KEY.to_string(), bytes(&info.monitor_secret)),
            (CEPH_USERNAME_KEY.to_string(), bytes(&info.ceph_cred.username)),
            (CEPH_SECRET_KEY.to_string(), bytes(&info.ceph_cred.secret)),
        ]);
        let secret = Secret {
            metadata: protected_meta(MON_SECRET_NAME, &info.namespace, Some(owner)),
            data: Some(data),
            type_: Some(ROOK_SECRET_TYPE.to_string()),
            ..Default::default()
        };
        self.resources.create_secret(&secret).await?;
        Ok(())
    }

    async fn load_identity(&self, namespace: &str, mut secret: Secret) -> Result<ClusterInfo> {
        let mut info = ClusterInfo::new(namespace);
        info.fsid = secret_value(&secret, FSID_KEY).unwrap_or_default();
        info.monitor_secret = secret_value(&secret, MON_SECRET_KEY).unwrap_or_default();

        match (
            secret_value(&secret, CEPH_USERNAME_KEY),
            secret_value(&secret, CEPH_SECRET_KEY),
            secret_value(&secret, LEGACY_ADMIN_SECRET_KEY),
        ) {
            (Some(username), Some(key), _) => {
                info.ceph_cred = CephCred {
                    username,
                    secret: key,
                };
            }
            (_, _, Some(admin)) => {
                info!(namespace = %namespace, "converting legacy admin secret to canonical credentials");
                info.ceph_cred = CephCred {
                    username: CEPH_ADMIN_USERNAME.to_string(),
                    secret: admin,
                };
                let data = secret.data.get_or_insert_with(BTreeMap::new);
                data.insert(CEPH_USERNAME_KEY.to_string(), bytes(CEPH_ADMIN_USERNAME));
                data.insert(CEPH_SECRET_KEY.to_string(), bytes(&info.ceph_cred.secret));
                self.resources.update_secret(&secret).await?;
            }
            _ => {
                return Err(Error::MissingCredentials {
                    secret: MON_SECRET_NAME.to_string(),
                })
            }
        }
        Ok(info)
    }
}

fn bytes(value: &str) -> ByteString {
    ByteString(value.as_bytes().to_vec())
}

/// Value of a secret key from `data`, falling back to `stringData`
fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
        .or_else(|| secret.string_data.as_ref().and_then(|d| d.get(key)).cloned())
        .filter(|v| !v.is_empty())
}

fn protected_meta(name: &str, namespace: &str, owner: Option<&OwnerReference>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        finalizers: Some(vec![DISASTER_PROTECTION_FINALIZER.to_string()]),
        owner_references: owner.map(|o| vec![o.clone()]),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryResourceClient, StaticKeyGenerator};
    use crate::clusterinfo::MonInfo;
    use assert_matches::assert_matches;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "ceph.rook.io/v1".into(),
            kind: "CephCluster".into(),
            name: "rook-ceph".into(),
            uid: "uid-1".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn store(resources: Arc<MemoryResourceClient>) -> (ClusterInfoStore, Arc<StaticKeyGenerator>) {
        let keys = Arc::new(StaticKeyGenerator::new("KEY"));
        (ClusterInfoStore::new(resources, keys.clone()), keys)
    }

    #[tokio::test]
    async fn test_bootstrap_new_cluster() {
        let resources = Arc::new(MemoryResourceClient::new());
        let (store, keys) = store(resources.clone());

        let info = store.create_or_load("rook-ceph", Some(&owner())).await.unwrap();
        assert_eq!(info.ceph_cred.username, "client.admin");
        assert_eq!(info.ceph_cred.secret, "KEY");
        assert_eq!(info.monitor_secret, "KEY");
        let fsid = uuid::Uuid::parse_str(&info.fsid).unwrap();
        assert_eq!(fsid.as_bytes().len(), 16);
        assert_eq!(info.max_mon_id, -1);
        assert_eq!(keys.calls(), 2);

        let secret = resources.secret("rook-ceph", MON_SECRET_NAME).unwrap();
        assert_eq!(
            secret.metadata.finalizers,
            Some(vec![DISASTER_PROTECTION_FINALIZER.to_string()])
        );
        assert_eq!(secret.metadata.owner_references.unwrap()[0].uid, "uid-1");

        // second load reads the same identity without minting keys
        let again = store.create_or_load("rook-ceph", Some(&owner())).await.unwrap();
        assert_eq!(again.fsid, info.fsid);
        assert_eq!(keys.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_secret_without_owner() {
        let (store, _) = store(Arc::new(MemoryResourceClient::new()));
        assert_matches!(
            store.create_or_load("rook-ceph", None).await,
            Err(Error::NoClusterNoSecret)
        );
    }

    #[tokio::test]
    async fn test_legacy_admin_secret_is_normalized() {
        let resources = Arc::new(MemoryResourceClient::new());
        let legacy = Secret {
            metadata: ObjectMeta {
                name: Some(MON_SECRET_NAME.into()),
                namespace: Some("rook-ceph".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (FSID_KEY.to_string(), bytes("f-s-i-d")),
                (MON_SECRET_KEY.to_string(), bytes("MONKEY")),
                (LEGACY_ADMIN_SECRET_KEY.to_string(), bytes("ADMINKEY")),
            ])),
            ..Default::default()
        };
        resources.create_secret(&legacy).await.unwrap();
        let (store, _) = store(resources.clone());

        let info = store.create_or_load("rook-ceph", None).await.unwrap();
        assert_eq!(info.ceph_cred.username, "client.admin");
        assert_eq!(info.ceph_cred.secret, "ADMINKEY");

        let stored = resources.secret("rook-ceph", MON_SECRET_NAME).unwrap();
        assert_eq!(secret_value(&stored, CEPH_USERNAME_KEY).as_deref(), Some("client.admin"));
        assert_eq!(secret_value(&stored, CEPH_SECRET_KEY).as_deref(), Some("ADMINKEY"));
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let resources = Arc::new(MemoryResourceClient::new());
        let bare = Secret {
            metadata: ObjectMeta {
                name: Some(MON_SECRET_NAME.into()),
                namespace: Some("rook-ceph".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(FSID_KEY.to_string(), bytes("f"))])),
            ..Default::default()
        };
        resources.create_secret(&bare).await.unwrap();
        let (store, _) = store(resources);
        assert_matches!(
            store.create_or_load("rook-ceph", None).await,
            Err(Error::MissingCredentials { .. })
        );
    }

    #[tokio::test]
    async fn test_endpoints_saved_and_loaded() {
        let resources = Arc::new(MemoryResourceClient::new());
        let (store, _) = store(resources.clone());
        let mut info = store.create_or_load("rook-ceph", Some(&owner())).await.unwrap();
        info.monitors.insert("a".into(), MonInfo::new("a", "10.0.0.1:6789"));
        info.monitors.insert("b".into(), MonInfo::new("b", "10.0.0.2:6789"));
        info.bump_max_mon_id(1);
        store.save_mon_endpoints(&info).await.unwrap();
        // unchanged data is not rewritten
        store.save_mon_endpoints(&info).await.unwrap();

        let cm = resources.config_map("rook-ceph", ENDPOINT_CONFIGMAP_NAME).unwrap();
        assert_eq!(cm.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(cm.data.unwrap()["data"], "a=10.0.0.1:6789,b=10.0.0.2:6789");

        let loaded = store.create_or_load("rook-ceph", None).await.unwrap();
        assert_eq!(loaded.monitors, info.monitors);
        assert_eq!(loaded.max_mon_id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_bootstrap_waits_for_secret() {
        let resources = Arc::new(MemoryResourceClient::new());
        let (store, _) = store(resources.clone());
        let cancel = CancellationToken::new();

        let provider = {
            let resources = resources.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(90)).await;
                let secret = Secret {
                    metadata: ObjectMeta {
                        name: Some(MON_SECRET_NAME.into()),
                        namespace: Some("rook-ceph".into()),
                        ..Default::default()
                    },
                    data: Some(BTreeMap::from([
                        (FSID_KEY.to_string(), bytes("ext-fsid")),
                        (CEPH_USERNAME_KEY.to_string(), bytes("client.healthchecker")),
                        (CEPH_SECRET_KEY.to_string(), bytes("HC")),
                    ])),
                    ..Default::default()
                };
                resources.create_secret(&secret).await.unwrap();
            }
        };

        let owner = owner();
        let (info, _) = tokio::join!(
            store.populate_external_cluster_info("rook-ceph", &owner, &cancel),
            provider
        );
        let info = info.unwrap();
        assert_eq!(info.ceph_cred.username, "client.healthchecker");
        assert_eq!(info.owner.unwrap().name, "rook-ceph");
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_bootstrap_cancelled() {
        let (store, _) = store(Arc::new(MemoryResourceClient::new()));
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                cancel.cancel();
            }
        };
        let owner = owner();
        let (result, _) = tokio::join!(
            store.populate_external_cluster_info("rook-ceph", &owner, &cancel),
            canceller
        );
        assert_matches!(result, Err(Error::Cancelled(_)));
    }
}
