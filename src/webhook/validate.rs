//! Admission validation
//!
//! Dispatches an `AdmissionRequest` by kind to the resource's create or
//! update validation. Deletes are always admitted; finalizers gate removal.

use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::controller::ResourceKind;
use crate::crd::*;
use crate::error::{Error, Result};
use crate::spec::Validate;

/// Status code carried by denials
pub const DENIAL_CODE: u16 = 400;

fn decode<K: DeserializeOwned>(obj: Option<&DynamicObject>, what: &str) -> Result<K> {
    let obj = obj.ok_or_else(|| Error::validation(format!("admission request has no {}", what)))?;
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn validate_as<K: Validate + DeserializeOwned>(req: &AdmissionRequest<DynamicObject>) -> Result<()> {
    match req.operation {
        Operation::Create => decode::<K>(req.object.as_ref(), "object")?.validate_create(),
        Operation::Update => {
            let new: K = decode(req.object.as_ref(), "object")?;
            let old: K = decode(req.old_object.as_ref(), "old object")?;
            new.validate_update(&old)
        }
        Operation::Delete | Operation::Connect => Ok(()),
    }
}

/// Validate one admission request
pub fn validate_request(req: &AdmissionRequest<DynamicObject>) -> Result<()> {
    if req.kind.group != CEPH_GROUP {
        return Err(Error::validation(format!(
            "unsupported group {:?}",
            req.kind.group
        )));
    }
    let kind: ResourceKind = req.kind.kind.parse()?;
    match kind {
        ResourceKind::Cluster => validate_as::<CephCluster>(req),
        ResourceKind::BlockPool => validate_as::<CephBlockPool>(req),
        ResourceKind::BlockPoolRadosNamespace => validate_as::<CephBlockPoolRadosNamespace>(req),
        ResourceKind::Filesystem => validate_as::<CephFilesystem>(req),
        ResourceKind::FilesystemMirror => validate_as::<CephFilesystemMirror>(req),
        ResourceKind::FilesystemSubVolumeGroup => validate_as::<CephFilesystemSubVolumeGroup>(req),
        ResourceKind::ObjectStore => validate_as::<CephObjectStore>(req),
        ResourceKind::ObjectStoreUser => validate_as::<CephObjectStoreUser>(req),
        ResourceKind::BucketTopic => validate_as::<CephBucketTopic>(req),
        ResourceKind::BucketNotification => validate_as::<CephBucketNotification>(req),
        ResourceKind::ObjectRealm => validate_as::<CephObjectRealm>(req),
        ResourceKind::ObjectZoneGroup => validate_as::<CephObjectZoneGroup>(req),
        ResourceKind::ObjectZone => validate_as::<CephObjectZone>(req),
        ResourceKind::Nfs => validate_as::<CephNFS>(req),
        ResourceKind::RbdMirror => validate_as::<CephRBDMirror>(req),
    }
}

/// Answer an admission review
pub fn review(body: AdmissionReview<DynamicObject>) -> AdmissionReview<DynamicObject> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "malformed admission review");
            return AdmissionResponse::invalid(e.to_string()).into_review();
        }
    };

    let response = AdmissionResponse::from(&req);
    match validate_request(&req) {
        Ok(()) => {
            debug!(kind = %req.kind.kind, name = %req.name, op = ?req.operation, "admitted");
            response.into_review()
        }
        Err(e) => {
            info!(kind = %req.kind.kind, name = %req.name, op = ?req.operation, error = %e, "denied");
            let mut response = response.deny(e.to_string());
            response.result.code = DENIAL_CODE;
            response.into_review()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn review_body(kind: &str, operation: &str, object: Value, old: Option<Value>) -> AdmissionReview<DynamicObject> {
        let mut request = json!({
            "uid": "7f3c-1",
            "kind": {"group": "ceph.rook.io", "version": "v1", "kind": kind},
            "resource": {"group": "ceph.rook.io", "version": "v1", "resource": format!("{}s", kind.to_lowercase())},
            "name": "test",
            "namespace": "rook-ceph",
            "operation": operation,
            "userInfo": {},
            "object": object,
            "dryRun": false
        });
        if let Some(old) = old {
            request["oldObject"] = old;
        }
        serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": request
        }))
        .unwrap()
    }

    fn object(kind: &str, spec: Value) -> Value {
        json!({
            "apiVersion": "ceph.rook.io/v1",
            "kind": kind,
            "metadata": {"name": "test", "namespace": "rook-ceph"},
            "spec": spec
        })
    }

    fn response(review: AdmissionReview<DynamicObject>) -> AdmissionResponse {
        review.response.unwrap()
    }

    #[test]
    fn test_pool_create() {
        let ok = object("CephBlockPool", json!({"erasureCoded": {"dataChunks": 2, "codingChunks": 1}}));
        assert!(response(review(review_body("CephBlockPool", "CREATE", ok, None))).allowed);

        let bad = object("CephBlockPool", json!({"erasureCoded": {"dataChunks": 1, "codingChunks": 1}}));
        let resp = response(review(review_body("CephBlockPool", "CREATE", bad, None)));
        assert!(!resp.allowed);
        assert_eq!(resp.result.code, DENIAL_CODE);
        assert!(resp.result.message.contains("needs minimum value of 2"), "{}", resp.result.message);
    }

    #[test]
    fn test_cluster_update_immutable() {
        let old = object("CephCluster", json!({"dataDirHostPath": "/a"}));
        let new = object("CephCluster", json!({"dataDirHostPath": "/b"}));
        let resp = response(review(review_body("CephCluster", "UPDATE", new, Some(old))));
        assert!(!resp.allowed);
    }

    #[test]
    fn test_delete_always_allowed() {
        let bad = object("CephBlockPool", json!({"erasureCoded": {"dataChunks": 1}}));
        assert!(response(review(review_body("CephBlockPool", "DELETE", bad, None))).allowed);
    }

    #[test]
    fn test_unknown_kind_denied() {
        let obj = object("CephWidget", json!({}));
        let resp = response(review(review_body("CephWidget", "CREATE", obj, None)));
        assert!(!resp.allowed);
        assert!(resp.result.message.contains("unsupported resource kind"));
    }
}
