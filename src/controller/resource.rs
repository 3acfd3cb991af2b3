//! Capabilities shared by every custom resource kind
//!
//! Kinds are dispatched through `ResourceKind` rather than a type hierarchy;
//! each CRD type implements `CephResource` for its status and validation.

use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{self, Debug};
use std::str::FromStr;

use crate::crd::*;
use crate::error::{Error, Result};
use crate::spec::Validate;
use crate::status::ConditionedStatus;

/// A reconcilable custom resource
pub trait CephResource:
    Resource<DynamicType = ()> + Validate + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static
{
    type Status: ConditionedStatus + Default + Clone + Serialize + Send + Sync;

    fn status(&self) -> Option<&Self::Status>;

    fn status_mut(&mut self) -> &mut Option<Self::Status>;

    fn conditions(&self) -> &[Condition] {
        self.status().map(|s| s.conditions()).unwrap_or(&[])
    }

    /// Status to mutate, created on first use
    fn status_or_default(&mut self) -> &mut Self::Status {
        self.status_mut().get_or_insert_with(Default::default)
    }

    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_default()
    }
}

macro_rules! ceph_resource {
    ($status:ty => $($kind:ty),+ $(,)?) => {
        $(
            impl CephResource for $kind {
                type Status = $status;

                fn status(&self) -> Option<&Self::Status> {
                    self.status.as_ref()
                }

                fn status_mut(&mut self) -> &mut Option<Self::Status> {
                    &mut self.status
                }
            }
        )+
    };
}

ceph_resource!(ClusterStatus => CephCluster);
ceph_resource!(ResourceStatus =>
    CephBlockPool,
    CephBlockPoolRadosNamespace,
    CephFilesystem,
    CephFilesystemMirror,
    CephFilesystemSubVolumeGroup,
    CephObjectStore,
    CephObjectStoreUser,
    CephBucketTopic,
    CephBucketNotification,
    CephObjectRealm,
    CephObjectZoneGroup,
    CephObjectZone,
    CephNFS,
    CephRBDMirror,
);

/// Every custom resource kind the operator serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cluster,
    BlockPool,
    BlockPoolRadosNamespace,
    Filesystem,
    FilesystemMirror,
    FilesystemSubVolumeGroup,
    ObjectStore,
    ObjectStoreUser,
    BucketTopic,
    BucketNotification,
    ObjectRealm,
    ObjectZoneGroup,
    ObjectZone,
    Nfs,
    RbdMirror,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 15] = [
        Self::Cluster,
        Self::BlockPool,
        Self::BlockPoolRadosNamespace,
        Self::Filesystem,
        Self::FilesystemMirror,
        Self::FilesystemSubVolumeGroup,
        Self::ObjectStore,
        Self::ObjectStoreUser,
        Self::BucketTopic,
        Self::BucketNotification,
        Self::ObjectRealm,
        Self::ObjectZoneGroup,
        Self::ObjectZone,
        Self::Nfs,
        Self::RbdMirror,
    ];

    /// The Kubernetes `kind`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "CephCluster",
            Self::BlockPool => "CephBlockPool",
            Self::BlockPoolRadosNamespace => "CephBlockPoolRadosNamespace",
            Self::Filesystem => "CephFilesystem",
            Self::FilesystemMirror => "CephFilesystemMirror",
            Self::FilesystemSubVolumeGroup => "CephFilesystemSubVolumeGroup",
            Self::ObjectStore => "CephObjectStore",
            Self::ObjectStoreUser => "CephObjectStoreUser",
            Self::BucketTopic => "CephBucketTopic",
            Self::BucketNotification => "CephBucketNotification",
            Self::ObjectRealm => "CephObjectRealm",
            Self::ObjectZoneGroup => "CephObjectZoneGroup",
            Self::ObjectZone => "CephObjectZone",
            Self::Nfs => "CephNFS",
            Self::RbdMirror => "CephRBDMirror",
        }
    }

    /// Self finalizer of the kind
    pub fn finalizer(&self) -> String {
        super::finalizer::finalizer_name(self.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unsupported resource kind {:?}", s)))
    }
}
