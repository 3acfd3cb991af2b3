//! Finalizer discipline
//!
//! Every resource carries a self finalizer `<kind>.ceph.rook.io`. Sub-resources
//! that must outlive a dependent use `<kind>.ceph.rook.io/<name>`. Updates go
//! through a merge patch pinned to the observed resource version, so a racing
//! writer yields `Error::Conflict` and the reconcile is requeued.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::{debug, info};

use crate::crd::CEPH_GROUP;
use crate::error::{Error, Result};

/// `<kind>.ceph.rook.io`, kind lower-cased
pub fn finalizer_name(kind: &str) -> String {
    format!("{}.{}", kind.to_lowercase(), CEPH_GROUP)
}

/// `<kind>.ceph.rook.io/<name>`
pub fn named_finalizer(kind: &str, name: &str) -> String {
    format!("{}/{}", finalizer_name(kind), name)
}

/// Append `finalizer` unless present; true when the list changed
pub fn add_finalizer_to_meta(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let list = meta.finalizers.get_or_insert_with(Vec::new);
    if list.iter().any(|f| f == finalizer) {
        return false;
    }
    list.push(finalizer.to_string());
    true
}

/// Drop every occurrence of `finalizer`; true when the list changed
pub fn remove_finalizer_from_meta(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(list) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = list.len();
    list.retain(|f| f != finalizer);
    list.len() != before
}

/// Finalizers other than the kind's self finalizer
pub fn non_self_finalizers(meta: &ObjectMeta, kind: &str) -> Vec<String> {
    let own = finalizer_name(kind);
    meta.finalizers
        .iter()
        .flatten()
        .filter(|f| **f != own)
        .cloned()
        .collect()
}

pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers.iter().flatten().any(|f| f == finalizer)
}

/// Ensure `finalizer` is on the object in the API server
pub async fn add_finalizer<K>(api: &Api<K>, obj: &K, finalizer: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let mut meta = obj.meta().clone();
    if !add_finalizer_to_meta(&mut meta, finalizer) {
        return Ok(false);
    }
    patch_finalizers(api, &meta).await?;
    info!(name = ?meta.name, finalizer = %finalizer, "added finalizer");
    Ok(true)
}

/// Ensure `finalizer` is gone from the object in the API server
pub async fn remove_finalizer<K>(api: &Api<K>, obj: &K, finalizer: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let mut meta = obj.meta().clone();
    if !remove_finalizer_from_meta(&mut meta, finalizer) {
        return Ok(false);
    }
    patch_finalizers(api, &meta).await?;
    info!(name = ?meta.name, finalizer = %finalizer, "removed finalizer");
    Ok(true)
}

async fn patch_finalizers<K>(api: &Api<K>, meta: &ObjectMeta) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let name = meta.name.clone().unwrap_or_default();
    let patch = json!({
        "metadata": {
            "finalizers": meta.finalizers.clone().unwrap_or_default(),
            "resourceVersion": meta.resource_version,
        }
    });
    match api
        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(resp)) if resp.code == 409 => {
            debug!(name = %name, "finalizer update conflicted");
            Err(Error::Conflict {
                kind: K::kind(&()).to_string(),
                name,
            })
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalizer_names() {
        assert_eq!(finalizer_name("CephBlockPool"), "cephblockpool.ceph.rook.io");
        assert_eq!(
            named_finalizer("CephFilesystem", "subvol-a"),
            "cephfilesystem.ceph.rook.io/subvol-a"
        );
    }

    #[test]
    fn test_add_remove_idempotent() {
        let mut meta = ObjectMeta::default();
        let f = finalizer_name("CephCluster");
        assert!(add_finalizer_to_meta(&mut meta, &f));
        assert!(!add_finalizer_to_meta(&mut meta, &f));
        assert_eq!(meta.finalizers.as_ref().unwrap(), &vec![f.clone()]);

        meta.finalizers.as_mut().unwrap().push(f.clone());
        assert!(remove_finalizer_from_meta(&mut meta, &f));
        assert!(!remove_finalizer_from_meta(&mut meta, &f));
        assert!(meta.finalizers.unwrap().is_empty());
        assert!(!remove_finalizer_from_meta(&mut ObjectMeta::default(), &f));
    }

    #[test]
    fn test_non_self_finalizers() {
        let meta = ObjectMeta {
            finalizers: Some(vec![
                finalizer_name("CephFilesystem"),
                named_finalizer("CephFilesystem", "group-a"),
                "kubernetes.io/pvc-protection".into(),
            ]),
            ..Default::default()
        };
        assert_eq!(
            non_self_finalizers(&meta, "CephFilesystem"),
            vec![
                "cephfilesystem.ceph.rook.io/group-a".to_string(),
                "kubernetes.io/pvc-protection".to_string()
            ]
        );
        assert!(has_finalizer(&meta, "kubernetes.io/pvc-protection"));
    }
}
