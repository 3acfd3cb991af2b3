//! Custom Resource Definitions for the Ceph operator
//!
//! This module contains all CRD types, all in the `ceph.rook.io/v1` group:
//! - CephCluster: the root aggregate
//! - CephBlockPool, CephBlockPoolRadosNamespace: block pools
//! - CephFilesystem, CephFilesystemMirror, CephFilesystemSubVolumeGroup
//! - CephObjectStore, CephObjectStoreUser, CephBucketTopic, CephBucketNotification
//! - CephObjectRealm, CephObjectZoneGroup, CephObjectZone: multisite
//! - CephNFS, CephRBDMirror

pub mod cluster;
pub mod common;
pub mod filesystem;
pub mod mirror;
pub mod multisite;
pub mod nfs;
pub mod object;
pub mod pool;
pub mod topic;

pub use cluster::*;
pub use common::*;
pub use filesystem::*;
pub use mirror::*;
pub use multisite::*;
pub use nfs::*;
pub use object::*;
pub use pool::*;
pub use topic::*;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Definitions of every custom resource, for installation manifests
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        CephCluster::crd(),
        CephBlockPool::crd(),
        CephBlockPoolRadosNamespace::crd(),
        CephFilesystem::crd(),
        CephFilesystemMirror::crd(),
        CephFilesystemSubVolumeGroup::crd(),
        CephObjectStore::crd(),
        CephObjectStoreUser::crd(),
        CephBucketTopic::crd(),
        CephBucketNotification::crd(),
        CephObjectRealm::crd(),
        CephObjectZoneGroup::crd(),
        CephObjectZone::crd(),
        CephNFS::crd(),
        CephRBDMirror::crd(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_crds_share_group() {
        let crds = all_crds();
        assert_eq!(crds.len(), 15);
        for crd in &crds {
            assert_eq!(crd.spec.group, CEPH_GROUP);
            assert_eq!(crd.spec.scope, "Namespaced");
            assert!(crd.spec.versions.iter().any(|v| v.name == CEPH_VERSION));
        }
        assert!(crds
            .iter()
            .any(|c| c.metadata.name.as_deref() == Some("cephclusters.ceph.rook.io")));
    }
}
