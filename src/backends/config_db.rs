//! Cluster configuration recorded in a config map
//!
//! Each applied setting lives under the key `<scope>.<key>` of the
//! `rook-ceph-config-db` config map in the cluster namespace, so a repeated
//! write of the same value is a no-op.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::ports::{ConfigStore, ResourceClient};
use crate::error::Result;

pub const CONFIG_DB_NAME: &str = "rook-ceph-config-db";

pub struct ConfigMapConfigStore {
    resources: Arc<dyn ResourceClient>,
    namespace: String,
    owner: Option<OwnerReference>,
}

impl ConfigMapConfigStore {
    pub fn new(
        resources: Arc<dyn ResourceClient>,
        namespace: impl Into<String>,
        owner: Option<OwnerReference>,
    ) -> Self {
        Self {
            resources,
            namespace: namespace.into(),
            owner,
        }
    }
}

#[async_trait]
impl ConfigStore for ConfigMapConfigStore {
    async fn set_if_changed(&self, scope: &str, key: &str, value: &str) -> Result<bool> {
        let full = format!("{}.{}", scope, key);
        let existing = self
            .resources
            .get_config_map(&self.namespace, CONFIG_DB_NAME)
            .await?;

        match existing {
            Some(mut cm) => {
                let data = cm.data.get_or_insert_with(BTreeMap::new);
                if data.get(&full).map(String::as_str) == Some(value) {
                    debug!(setting = %full, "config unchanged");
                    return Ok(false);
                }
                data.insert(full.clone(), value.to_string());
                self.resources.update_config_map(&cm).await?;
            }
            None => {
                let cm = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(CONFIG_DB_NAME.to_string()),
                        namespace: Some(self.namespace.clone()),
                        owner_references: self.owner.clone().map(|o| vec![o]),
                        ..Default::default()
                    },
                    data: Some(BTreeMap::from([(full.clone(), value.to_string())])),
                    ..Default::default()
                };
                self.resources.create_config_map(&cm).await?;
            }
        }
        info!(setting = %full, value = %value, "config updated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryResourceClient;

    #[tokio::test]
    async fn test_set_if_changed_creates_then_noops() {
        let resources = Arc::new(MemoryResourceClient::new());
        let store = ConfigMapConfigStore::new(resources.clone(), "rook-ceph", None);

        assert!(store.set_if_changed("global", "public_network", "10.0.0.0/16").await.unwrap());
        assert!(!store.set_if_changed("global", "public_network", "10.0.0.0/16").await.unwrap());
        assert!(store.set_if_changed("global", "cluster_network", "10.1.0.0/16").await.unwrap());

        let cm = resources.config_map("rook-ceph", CONFIG_DB_NAME).unwrap();
        let data = cm.data.unwrap();
        assert_eq!(data["global.public_network"], "10.0.0.0/16");
        assert_eq!(data["global.cluster_network"], "10.1.0.0/16");
    }
}
