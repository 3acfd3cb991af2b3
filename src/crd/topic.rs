//! CephBucketTopic and CephBucketNotification CRDs

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::ResourceStatus;

// =============================================================================
// CephBucketTopic CRD
// =============================================================================

/// A bucket notification topic pushing to an HTTP, AMQP or Kafka endpoint
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephBucketTopic",
    plural = "cephbuckettopics",
    status = "ResourceStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BucketTopicSpec {
    #[serde(default)]
    pub object_store_name: String,

    #[serde(default)]
    pub object_store_namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub opaque_data: String,

    #[serde(default)]
    pub persistent: bool,

    #[serde(default)]
    pub endpoint: TopicEndpointSpec,
}

/// Exactly one variant must be set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicEndpointSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpEndpointSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amqp: Option<AmqpEndpointSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<KafkaEndpointSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpEndpointSpec {
    pub uri: String,
    #[serde(default)]
    pub disable_verify_ssl: bool,
    #[serde(default)]
    pub send_cloud_events: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AmqpEndpointSpec {
    pub uri: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub disable_verify_ssl: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ack_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaEndpointSpec {
    pub uri: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub disable_verify_ssl: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ack_level: String,
}

/// Endpoint variant of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicEndpointKind {
    Http,
    Amqp,
    Kafka,
}

impl TopicEndpointKind {
    /// URI schemes accepted for the variant
    pub fn schemes(&self) -> &'static [&'static str] {
        match self {
            TopicEndpointKind::Http => &["http", "https"],
            TopicEndpointKind::Amqp => &["amqp", "amqps"],
            TopicEndpointKind::Kafka => &["kafka"],
        }
    }
}

impl std::fmt::Display for TopicEndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicEndpointKind::Http => write!(f, "HTTP"),
            TopicEndpointKind::Amqp => write!(f, "AMQP"),
            TopicEndpointKind::Kafka => write!(f, "Kafka"),
        }
    }
}

impl TopicEndpointSpec {
    /// Every variant that is set, with its URI
    pub fn configured(&self) -> Vec<(TopicEndpointKind, &str)> {
        let mut out = Vec::new();
        if let Some(h) = &self.http {
            out.push((TopicEndpointKind::Http, h.uri.as_str()));
        }
        if let Some(a) = &self.amqp {
            out.push((TopicEndpointKind::Amqp, a.uri.as_str()));
        }
        if let Some(k) = &self.kafka {
            out.push((TopicEndpointKind::Kafka, k.uri.as_str()));
        }
        out
    }
}

// =============================================================================
// CephBucketNotification CRD
// =============================================================================

/// Binds a topic to bucket events
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "ceph.rook.io",
    version = "v1",
    kind = "CephBucketNotification",
    plural = "cephbucketnotifications",
    status = "ResourceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BucketNotificationSpec {
    /// Name of the CephBucketTopic in the same namespace
    #[serde(default)]
    pub topic: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<NotificationFilterSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilterSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_filters: Vec<NotificationKeyFilterRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationKeyFilterRule {
    /// prefix, suffix or regex
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_endpoints() {
        let spec: TopicEndpointSpec = serde_json::from_value(serde_json::json!({
            "http": {"uri": "https://host:9999"},
            "kafka": {"uri": "kafka://broker:9092"}
        }))
        .unwrap();
        let set = spec.configured();
        assert_eq!(set.len(), 2);
        assert_eq!(set[0], (TopicEndpointKind::Http, "https://host:9999"));
        assert_eq!(set[1].0, TopicEndpointKind::Kafka);
        assert_eq!(TopicEndpointKind::Amqp.schemes(), &["amqp", "amqps"]);
    }
}
