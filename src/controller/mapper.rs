//! Secondary-object mappers
//!
//! A change to a secret referenced through `cephConfigFromSecret` must
//! reconcile every cluster in that namespace.

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use std::sync::Arc;

use crate::crd::CephCluster;

/// Clusters to reconcile after `secret` changed
///
/// Empty unless at least one cluster in the secret's namespace references it.
pub fn map_secret_to_clusters(
    secret: &Secret,
    clusters: &[Arc<CephCluster>],
) -> Vec<ObjectRef<CephCluster>> {
    let namespace = secret.namespace().unwrap_or_default();
    let name = secret.name_any();

    let in_namespace: Vec<&Arc<CephCluster>> = clusters
        .iter()
        .filter(|c| c.namespace().unwrap_or_default() == namespace)
        .collect();

    let referenced = in_namespace
        .iter()
        .any(|c| c.referenced_secrets().contains(&name.as_str()));
    if !referenced {
        return Vec::new();
    }

    in_namespace
        .into_iter()
        .map(|c| ObjectRef::from_obj(c.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ClusterSpec;
    use k8s_openapi::api::core::v1::SecretKeySelector;
    use std::collections::BTreeMap;

    fn cluster(ns: &str, name: &str, secret: Option<&str>) -> Arc<CephCluster> {
        let mut spec = ClusterSpec::default();
        if let Some(secret) = secret {
            spec.ceph_config_from_secret.insert(
                "global".into(),
                BTreeMap::from([(
                    "osd_pool_default_size".to_string(),
                    SecretKeySelector {
                        name: Some(secret.into()),
                        key: "size".into(),
                        optional: None,
                    },
                )]),
            );
        }
        let mut c = CephCluster::new(name, spec);
        c.metadata.namespace = Some(ns.into());
        Arc::new(c)
    }

    fn secret(ns: &str, name: &str) -> Secret {
        let mut s = Secret::default();
        s.metadata.namespace = Some(ns.into());
        s.metadata.name = Some(name.into());
        s
    }

    #[test]
    fn test_referenced_secret_maps_namespace() {
        let clusters = vec![
            cluster("rook-ceph", "a", Some("ceph-conf")),
            cluster("rook-ceph", "b", None),
            cluster("other", "c", Some("ceph-conf")),
        ];
        let refs = map_secret_to_clusters(&secret("rook-ceph", "ceph-conf"), &clusters);
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_unreferenced_secret_maps_nothing() {
        let clusters = vec![cluster("rook-ceph", "a", Some("ceph-conf"))];
        assert!(map_secret_to_clusters(&secret("rook-ceph", "unrelated"), &clusters).is_empty());
        assert!(map_secret_to_clusters(&secret("other", "ceph-conf"), &clusters).is_empty());
    }
}
