//! CephObjectStore and CephObjectStoreUser CRDs

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::{HealthCheckSpec, ResourceStatus};
use super::pool::PoolSpec;
use crate::error::{Error, Result};
use crate::spec::keyed::ProbeSpec;
use crate::spec::placement::Placement;

/// Service annotation asking the platform to mint a serving certificate
pub const SERVICE_SERVING_CERT_KEY: &str = "service.beta.openshift.io/serving-cert-secret-name";

/// Longest object store name the gateway service naming allows
pub const MAX_OBJECT_STORE_NAME_LEN: usize = 38;

// =============================================================================
// CephObjectStore CRD
// =============================================================================

/// An S3/Swift object store served by RGW
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephObjectStore",
    plural = "cephobjectstores",
    shortname = "cephos",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Endpoint", "type": "string", "jsonPath": ".status.info.endpoint"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreSpec {
    #[serde(default)]
    pub metadata_pool: PoolSpec,

    #[serde(default)]
    pub data_pool: PoolSpec,

    #[serde(default)]
    pub preserve_pools_on_delete: bool,

    #[serde(default)]
    pub gateway: GatewaySpec,

    /// Zone this store belongs to; set for multisite stores
    #[serde(default)]
    pub zone: ZoneRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosting: Option<ObjectStoreHostingSpec>,

    #[serde(default)]
    pub health_check: ObjectHealthCheckSpec,
}

/// RGW daemon settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    #[serde(default)]
    pub port: i32,

    #[serde(default)]
    pub secure_port: i32,

    #[serde(default)]
    pub instances: i32,

    /// Secret holding the TLS certificate
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssl_certificate_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<RgwServiceSpec>,

    /// Endpoints of an externally managed gateway
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_rgw_endpoints: Vec<EndpointAddress>,

    #[serde(default)]
    pub placement: Placement,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority_class_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RgwServiceSpec {
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// An IP or hostname of an external gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAddress {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
}

impl EndpointAddress {
    pub fn address(&self) -> &str {
        if self.ip.is_empty() {
            &self.hostname
        } else {
            &self.ip
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ZoneRef {
    #[serde(default)]
    pub name: String,
}

/// How clients should reach the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreHostingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_endpoint: Option<ObjectEndpointSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEndpointSpec {
    pub dns_name: String,
    pub port: i32,
    #[serde(default)]
    pub use_tls: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectHealthCheckSpec {
    #[serde(default)]
    pub bucket: HealthCheckSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<ProbeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<ProbeSpec>,
}

impl ObjectStoreSpec {
    /// TLS needs a secure port and a certificate source
    pub fn is_tls_enabled(&self) -> bool {
        self.gateway.secure_port != 0
            && (!self.gateway.ssl_certificate_ref.is_empty()
                || self.service_serving_cert().is_some())
    }

    fn service_serving_cert(&self) -> Option<&str> {
        self.gateway
            .service
            .as_ref()?
            .annotations
            .get(SERVICE_SERVING_CERT_KEY)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is_multisite(&self) -> bool {
        !self.zone.name.is_empty()
    }

    pub fn is_external(&self) -> bool {
        !self.gateway.external_rgw_endpoints.is_empty()
    }

    /// Port clients connect on, preferring TLS when it is usable
    pub fn client_port(&self) -> Result<(bool, i32)> {
        if self.is_tls_enabled() {
            return Ok((true, self.gateway.secure_port));
        }
        if self.gateway.port > 0 {
            return Ok((false, self.gateway.port));
        }
        Err(Error::validation(
            "at least one of Port or SecurePort (with a certificate) must be set",
        ))
    }
}

impl CephObjectStore {
    /// In-cluster DNS name of the gateway service
    pub fn service_domain_name(&self) -> String {
        format!(
            "rook-ceph-rgw-{}.{}.svc",
            self.metadata.name.as_deref().unwrap_or(""),
            self.metadata.namespace.as_deref().unwrap_or("")
        )
    }

    /// URL clients should use to reach the store
    ///
    /// An advertise endpoint wins; then the first external gateway endpoint;
    /// then the in-cluster service. A usable port is required in every case.
    pub fn advertise_endpoint_url(&self) -> Result<String> {
        let (tls, port) = self.spec.client_port()?;

        if let Some(ep) = self
            .spec
            .hosting
            .as_ref()
            .and_then(|h| h.advertise_endpoint.as_ref())
        {
            let scheme = if ep.use_tls { "https" } else { "http" };
            return Ok(format!("{}://{}:{}", scheme, ep.dns_name, ep.port));
        }

        let scheme = if tls { "https" } else { "http" };
        let host = match self.spec.gateway.external_rgw_endpoints.first() {
            Some(ep) => ep.address().to_string(),
            None => self.service_domain_name(),
        };
        Ok(format!("{}://{}:{}", scheme, host, port))
    }
}

// =============================================================================
// CephObjectStoreUser CRD
// =============================================================================

/// An RGW user in a store
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephObjectStoreUser",
    plural = "cephobjectstoreusers",
    shortname = "rcou",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreUserSpec {
    /// Store the user is created in
    #[serde(default)]
    pub store: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotas: Option<ObjectUserQuotaSpec>,

    /// Comma separated list of read, write, delete or `*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_mask: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUserQuotaSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_buckets: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_objects: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(port: i32, secure_port: i32, cert: &str) -> CephObjectStore {
        let mut s = CephObjectStore::new("my-store", ObjectStoreSpec::default());
        s.metadata.namespace = Some("my-ns".into());
        s.spec.gateway.port = port;
        s.spec.gateway.secure_port = secure_port;
        s.spec.gateway.ssl_certificate_ref = cert.into();
        s
    }

    #[test]
    fn test_is_tls_enabled() {
        let mut s = store(1, 0, "");
        assert!(!s.spec.is_tls_enabled());

        s.spec.gateway.secure_port = 443;
        assert!(!s.spec.is_tls_enabled());

        s.spec.gateway.ssl_certificate_ref = "my-tls-cert".into();
        assert!(s.spec.is_tls_enabled());

        s.spec.gateway.ssl_certificate_ref.clear();
        s.spec.gateway.service = Some(RgwServiceSpec {
            annotations: BTreeMap::from([(SERVICE_SERVING_CERT_KEY.into(), "rgw-cert".into())]),
        });
        assert!(s.spec.is_tls_enabled());

        s.spec.gateway.secure_port = 0;
        assert!(!s.spec.is_tls_enabled());
    }

    #[test]
    fn test_advertise_endpoint_internal() {
        assert_eq!(
            store(8080, 0, "").advertise_endpoint_url().unwrap(),
            "http://rook-ceph-rgw-my-store.my-ns.svc:8080"
        );
        assert_eq!(
            store(8080, 8443, "my-cert").advertise_endpoint_url().unwrap(),
            "https://rook-ceph-rgw-my-store.my-ns.svc:8443"
        );
        // secure port without a certificate falls back to the clear-text port
        assert_eq!(
            store(8080, 8443, "").advertise_endpoint_url().unwrap(),
            "http://rook-ceph-rgw-my-store.my-ns.svc:8080"
        );
        let err = store(0, 8443, "").advertise_endpoint_url().unwrap_err();
        assert!(err.to_string().contains("Port"));
    }

    #[test]
    fn test_advertise_endpoint_external_and_hosting() {
        let mut s = store(8080, 0, "");
        s.spec.gateway.external_rgw_endpoints = vec![
            EndpointAddress {
                hostname: "s3.external.com".into(),
                ..Default::default()
            },
            EndpointAddress {
                ip: "192.168.1.2".into(),
                ..Default::default()
            },
        ];
        assert!(s.spec.is_external());
        assert_eq!(s.advertise_endpoint_url().unwrap(), "http://s3.external.com:8080");

        s.spec.hosting = Some(ObjectStoreHostingSpec {
            advertise_endpoint: Some(ObjectEndpointSpec {
                dns_name: "my-endpoint.com".into(),
                port: 443,
                use_tls: true,
            }),
            dns_names: vec!["should.not.show.up".into()],
        });
        assert_eq!(s.advertise_endpoint_url().unwrap(), "https://my-endpoint.com:443");

        s.spec.gateway.port = 0;
        assert!(s.advertise_endpoint_url().is_err());
    }
}
