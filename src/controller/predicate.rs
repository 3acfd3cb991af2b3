//! Event predicates
//!
//! Decide which watch events warrant a reconcile. Parent resources pass on
//! spec, deletion or version-label changes; owned objects pass on deletion
//! and on structural changes. `EventGate` turns a raw watcher stream into
//! create/update/delete events by remembering the last object it saw.

use dashmap::DashMap;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::runtime::watcher;
use kube::Resource;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

use super::owner::OwnerMatcher;

/// Label that pauses reconciliation of a parent resource
pub const DO_NOT_RECONCILE_LABEL: &str = "do_not_reconcile";

/// Label carrying the running Ceph version
pub const CEPH_VERSION_LABEL: &str = "ceph_version";

/// The one config map whose updates always reconcile
pub const CONFIG_OVERRIDE_NAME: &str = "rook-config-override";

/// Generated config secret that must not trigger reconciles
pub const CONFIG_SECRET_NAME: &str = "rook-ceph-config";

const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";
const MON_CANARY_LABEL: &str = "mon_canary";
const CRASH_COLLECTOR_APP: &str = "rook-ceph-crashcollector";

/// A watch event as seen by a predicate
#[derive(Debug)]
pub enum WatchEvent<'a, K> {
    Create(&'a K),
    Update { old: &'a K, new: &'a K },
    Delete(&'a K),
    Generic(&'a K),
}

// =============================================================================
// Parent resources
// =============================================================================

/// Predicate for the custom resources the operator reconciles
pub fn parent_predicate<K: Resource + Serialize>(event: &WatchEvent<'_, K>) -> bool {
    match event {
        WatchEvent::Create(_) | WatchEvent::Delete(_) => true,
        WatchEvent::Generic(_) => false,
        WatchEvent::Update { old, new } => {
            if label(new.meta(), DO_NOT_RECONCILE_LABEL) == Some("true") {
                debug!(name = ?new.meta().name, "skipping reconcile, do_not_reconcile is set");
                return false;
            }
            if old.meta().deletion_timestamp != new.meta().deletion_timestamp {
                return true;
            }
            if label(old.meta(), CEPH_VERSION_LABEL) != label(new.meta(), CEPH_VERSION_LABEL) {
                return true;
            }
            let old_spec = spec_of(*old);
            let new_spec = spec_of(*new);
            let changed = !values_equal(&old_spec, &new_spec);
            if changed {
                trace!(name = ?new.meta().name, "spec changed");
            }
            changed
        }
    }
}

fn label<'a>(meta: &'a k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels.as_ref().and_then(|l| l.get(key)).map(String::as_str)
}

fn spec_of<K: Serialize>(obj: &K) -> Value {
    serde_json::to_value(obj)
        .ok()
        .and_then(|v| v.get("spec").cloned())
        .unwrap_or(Value::Null)
}

// =============================================================================
// Owned objects
// =============================================================================

/// Predicate for objects owned by a parent (secrets, config maps, deployments)
pub fn object_predicate<K>(matcher: &OwnerMatcher, event: &WatchEvent<'_, K>) -> bool
where
    K: Resource<DynamicType = ()> + Serialize,
{
    match event {
        // the parent's own watch covers creations
        WatchEvent::Create(_) | WatchEvent::Generic(_) => false,
        WatchEvent::Delete(obj) => !is_ephemeral(*obj) && matcher.matches(obj.meta()),
        WatchEvent::Update { old, new } => {
            if !matcher.matches(new.meta()) {
                return false;
            }
            if label(new.meta(), DO_NOT_RECONCILE_LABEL) == Some("true") {
                debug!(name = ?new.meta().name, "skipping reconcile, do_not_reconcile is set");
                return false;
            }
            let kind = K::kind(&());
            let name = new.meta().name.as_deref().unwrap_or_default();
            if kind == ConfigMap::kind(&()) && name != CONFIG_OVERRIDE_NAME {
                return false;
            }
            if (kind == Secret::kind(&()) && name == CONFIG_SECRET_NAME)
                || kind == Deployment::kind(&())
            {
                return false;
            }
            !values_equal(&comparable(*old), &comparable(*new))
        }
    }
}

/// Predicate for referenced objects the parent does not own
pub fn secondary_predicate<K: Serialize>(event: &WatchEvent<'_, K>) -> bool {
    match event {
        WatchEvent::Create(_) | WatchEvent::Delete(_) => true,
        WatchEvent::Generic(_) => false,
        WatchEvent::Update { old, new } => !values_equal(&comparable(*old), &comparable(*new)),
    }
}

/// Objects that come and go during normal operation
fn is_ephemeral<K: Resource<DynamicType = ()>>(obj: &K) -> bool {
    let kind = K::kind(&());
    let meta = obj.meta();
    let name = meta.name.as_deref().unwrap_or_default();
    if kind == ConfigMap::kind(&()) {
        return name.starts_with("rook-ceph-osd-") && name.ends_with("-status");
    }
    if kind == Deployment::kind(&()) {
        return label(meta, MON_CANARY_LABEL) == Some("true")
            || label(meta, "app") == Some(CRASH_COLLECTOR_APP);
    }
    false
}

/// Serialized object without status, sync bookkeeping and rollout noise
fn comparable<K: Serialize>(obj: &K) -> Value {
    let mut v = serde_json::to_value(obj).unwrap_or(Value::Null);
    if let Some(map) = v.as_object_mut() {
        map.remove("status");
        if let Some(meta) = map.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.remove("resourceVersion");
            meta.remove("managedFields");
            meta.remove("generation");
            if let Some(ann) = meta.get_mut("annotations").and_then(Value::as_object_mut) {
                ann.remove(DEPLOYMENT_REVISION_ANNOTATION);
            }
        }
    }
    v
}

// =============================================================================
// Quantity-aware comparison
// =============================================================================

/// Deep equality where strings holding equal quantities (`1Gi`, `1024Mi`) match
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            let keys: std::collections::BTreeSet<&String> = x.keys().chain(y.keys()).collect();
            keys.into_iter().all(|k| {
                let l = x.get(k).unwrap_or(&Value::Null);
                let r = y.get(k).unwrap_or(&Value::Null);
                values_equal(l, r)
            })
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::String(x), Value::String(y)) => {
            x == y
                || ((has_unit(x) || has_unit(y))
                    && matches!((parse_quantity(x), parse_quantity(y)), (Some(l), Some(r)) if l == r))
        }
        _ => a == b,
    }
}

/// A quantity written with a suffix; bare numbers compare as plain strings
fn has_unit(s: &str) -> bool {
    parse_quantity(s).is_some() && s.trim().ends_with(|c: char| c.is_ascii_alphabetic())
}

/// Parse a Kubernetes quantity into its base value
pub fn parse_quantity(s: &str) -> Option<f64> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    if number.is_empty() {
        return None;
    }
    let number: f64 = number.parse().ok()?;
    let factor = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        _ => return None,
    };
    Some(number * factor)
}

// =============================================================================
// Event gate
// =============================================================================

type Predicate<K> = Arc<dyn Fn(&WatchEvent<'_, K>) -> bool + Send + Sync>;

/// Turns watcher events into predicate-filtered triggers
///
/// Remembers the last version of each object so applied events can be
/// classified as create or update.
pub struct EventGate<K> {
    last: DashMap<String, K>,
    predicate: Predicate<K>,
}

impl<K: Resource + Clone> EventGate<K> {
    pub fn new(predicate: impl Fn(&WatchEvent<'_, K>) -> bool + Send + Sync + 'static) -> Self {
        Self {
            last: DashMap::new(),
            predicate: Arc::new(predicate),
        }
    }

    fn key(obj: &K) -> String {
        let meta = obj.meta();
        format!(
            "{}/{}",
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default()
        )
    }

    fn applied(&self, obj: K) -> Option<K> {
        let previous = self.last.insert(Self::key(&obj), obj.clone());
        let pass = match &previous {
            None => (self.predicate)(&WatchEvent::Create(&obj)),
            Some(old) => (self.predicate)(&WatchEvent::Update { old, new: &obj }),
        };
        pass.then_some(obj)
    }

    /// Objects from one watcher event that should trigger a reconcile
    pub fn filter(&self, event: watcher::Event<K>) -> Vec<K> {
        match event {
            watcher::Event::Applied(obj) => self.applied(obj).into_iter().collect(),
            watcher::Event::Deleted(obj) => {
                self.last.remove(&Self::key(&obj));
                if (self.predicate)(&WatchEvent::Delete(&obj)) {
                    vec![obj]
                } else {
                    Vec::new()
                }
            }
            watcher::Event::Restarted(objs) => {
                objs.into_iter().filter_map(|o| self.applied(o)).collect()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
