//! Owner references

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::crd::CephCluster;

/// Matches children by their owner references against one parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerMatcher {
    kind: String,
    group: String,
    uid: String,
}

impl OwnerMatcher {
    /// Matcher for a parent object
    pub fn for_parent<K: Resource<DynamicType = ()>>(parent: &K) -> Self {
        Self {
            kind: K::kind(&()).to_string(),
            group: K::group(&()).to_string(),
            uid: parent.meta().uid.clone().unwrap_or_default(),
        }
    }

    /// Matcher for any parent of a kind
    pub fn for_kind<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            kind: K::kind(&()).to_string(),
            group: K::group(&()).to_string(),
            uid: String::new(),
        }
    }

    /// True when one owner reference has the parent's kind and group and
    /// either no UID or the parent's UID
    pub fn matches(&self, child: &ObjectMeta) -> bool {
        child
            .owner_references
            .iter()
            .flatten()
            .any(|r| self.matches_ref(r))
    }

    fn matches_ref(&self, owner: &OwnerReference) -> bool {
        owner.kind == self.kind
            && api_group(&owner.api_version) == self.group
            && (owner.uid.is_empty() || self.uid.is_empty() || owner.uid == self.uid)
    }
}

/// Group part of an `apiVersion`; empty for the core group
fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

/// Controller owner reference to a `CephCluster`
pub fn cluster_owner_ref(name: &str, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: CephCluster::api_version(&()).to_string(),
        kind: CephCluster::kind(&()).to_string(),
        name: name.to_string(),
        uid: uid.to_string(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}
