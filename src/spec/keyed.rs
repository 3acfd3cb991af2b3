//! Per-component keyed maps
//!
//! Annotations, labels, placement, priority class names, resources and
//! probes are all configured as maps from a component key (`all`, `mon`,
//! `osd`, ...) to a sub-spec. A lookup for a component merges the `all`
//! entry with the component entry, the component entry winning.

use k8s_openapi::api::core::v1::{Probe, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::placement::Placement;

// =============================================================================
// Component Keys
// =============================================================================

/// Component key of a keyed map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKey {
    All,
    Mon,
    Mgr,
    Osd,
    Mds,
    Rgw,
    RbdMirror,
    PrepareOsd,
    Cleanup,
    Monitoring,
    Arbiter,
    FsMirror,
    CrashCollector,
    LogCollector,
    MgrSidecar,
    Nfs,
}

impl ComponentKey {
    /// The map key used in the CRD
    pub const fn as_str(&self) -> &'static str {
        match self {
            ComponentKey::All => "all",
            ComponentKey::Mon => "mon",
            ComponentKey::Mgr => "mgr",
            ComponentKey::Osd => "osd",
            ComponentKey::Mds => "mds",
            ComponentKey::Rgw => "rgw",
            ComponentKey::RbdMirror => "rbdmirror",
            ComponentKey::PrepareOsd => "prepareosd",
            ComponentKey::Cleanup => "cleanup",
            ComponentKey::Monitoring => "monitoring",
            ComponentKey::Arbiter => "arbiter",
            ComponentKey::FsMirror => "fsmirror",
            ComponentKey::CrashCollector => "crashcollector",
            ComponentKey::LogCollector => "logcollector",
            ComponentKey::MgrSidecar => "mgr-sidecar",
            ComponentKey::Nfs => "nfs",
        }
    }
}

impl std::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Merge
// =============================================================================

/// Values that can be layered: `self` is the default, `other` the override
pub trait Merge: Clone {
    fn merge(&self, other: &Self) -> Self;
}

impl Merge for BTreeMap<String, String> {
    fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (k, v) in other {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

impl Merge for String {
    fn merge(&self, other: &Self) -> Self {
        if other.is_empty() {
            self.clone()
        } else {
            other.clone()
        }
    }
}

impl Merge for ResourceRequirements {
    fn merge(&self, other: &Self) -> Self {
        let layer = |base: &Option<BTreeMap<String, Quantity>>, over: &Option<BTreeMap<String, Quantity>>| {
            match (base, over) {
                (None, None) => None,
                (Some(b), None) => Some(b.clone()),
                (None, Some(o)) => Some(o.clone()),
                (Some(b), Some(o)) => {
                    let mut out = b.clone();
                    out.extend(o.iter().map(|(k, v)| (k.clone(), v.clone())));
                    Some(out)
                }
            }
        };
        ResourceRequirements {
            claims: other.claims.clone().or_else(|| self.claims.clone()),
            limits: layer(&self.limits, &other.limits),
            requests: layer(&self.requests, &other.requests),
        }
    }
}

/// Look up `key` in `map`, layering the `all` entry under it when asked to
pub fn lookup<T: Merge>(
    map: &BTreeMap<String, T>,
    key: ComponentKey,
    inherit_all: bool,
) -> Option<T> {
    let specific = map.get(key.as_str());
    let all = if inherit_all && key != ComponentKey::All {
        map.get(ComponentKey::All.as_str())
    } else {
        None
    };

    match (all, specific) {
        (Some(all), Some(specific)) => Some(all.merge(specific)),
        (None, Some(specific)) => Some(specific.clone()),
        (Some(all), None) => Some(all.clone()),
        (None, None) => None,
    }
}

// =============================================================================
// Annotations and Labels
// =============================================================================

/// Annotations applied to a single component
pub type Annotations = BTreeMap<String, String>;

/// Labels applied to a single component
pub type Labels = BTreeMap<String, String>;

/// Annotations keyed by component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AnnotationsSpec(pub BTreeMap<String, Annotations>);

/// Labels keyed by component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LabelsSpec(pub BTreeMap<String, Labels>);

impl AnnotationsSpec {
    /// Annotations for a component, `all` merged underneath
    pub fn get(&self, key: ComponentKey) -> Annotations {
        lookup(&self.0, key, true).unwrap_or_default()
    }

    pub fn mon(&self) -> Annotations {
        self.get(ComponentKey::Mon)
    }

    pub fn mgr(&self) -> Annotations {
        self.get(ComponentKey::Mgr)
    }

    pub fn osd(&self) -> Annotations {
        self.get(ComponentKey::Osd)
    }

    pub fn cleanup(&self) -> Annotations {
        self.get(ComponentKey::Cleanup)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl LabelsSpec {
    /// Labels for a component, `all` merged underneath
    pub fn get(&self, key: ComponentKey) -> Labels {
        lookup(&self.0, key, true).unwrap_or_default()
    }

    pub fn mon(&self) -> Labels {
        self.get(ComponentKey::Mon)
    }

    pub fn mgr(&self) -> Labels {
        self.get(ComponentKey::Mgr)
    }

    pub fn osd(&self) -> Labels {
        self.get(ComponentKey::Osd)
    }

    pub fn cleanup(&self) -> Labels {
        self.get(ComponentKey::Cleanup)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Merge `values` into the annotations of `meta` without dropping existing ones
pub fn apply_annotations(values: &Annotations, meta: &mut ObjectMeta) {
    if values.is_empty() {
        return;
    }
    let target = meta.annotations.get_or_insert_with(BTreeMap::new);
    for (k, v) in values {
        target.insert(k.clone(), v.clone());
    }
}

/// Merge `values` into the labels of `meta`; existing keys are kept
pub fn apply_labels(values: &Labels, meta: &mut ObjectMeta) {
    if values.is_empty() {
        return;
    }
    let target = meta.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in values {
        target.entry(k.clone()).or_insert_with(|| v.clone());
    }
}

// =============================================================================
// Placement, Priority Classes, Resources, Probes
// =============================================================================

/// Placement keyed by component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PlacementSpec(pub BTreeMap<String, Placement>);

impl PlacementSpec {
    /// Placement for a component. The arbiter never inherits `all`.
    pub fn get(&self, key: ComponentKey) -> Placement {
        let inherit = key != ComponentKey::Arbiter;
        lookup(&self.0, key, inherit).unwrap_or_default()
    }

    pub fn mon(&self) -> Placement {
        self.get(ComponentKey::Mon)
    }

    pub fn osd(&self) -> Placement {
        self.get(ComponentKey::Osd)
    }

    pub fn arbiter(&self) -> Placement {
        self.get(ComponentKey::Arbiter)
    }

    pub fn cleanup(&self) -> Placement {
        self.get(ComponentKey::Cleanup)
    }
}

/// Priority class names keyed by component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PriorityClassNamesSpec(pub BTreeMap<String, String>);

impl PriorityClassNamesSpec {
    /// Priority class for a component; empty when unset
    pub fn get(&self, key: ComponentKey) -> String {
        lookup(&self.0, key, true).unwrap_or_default()
    }

    pub fn cleanup(&self) -> String {
        self.get(ComponentKey::Cleanup)
    }
}

/// Resource requirements keyed by component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ResourceSpec(pub BTreeMap<String, ResourceRequirements>);

impl ResourceSpec {
    pub fn get(&self, key: ComponentKey) -> ResourceRequirements {
        lookup(&self.0, key, true).unwrap_or_default()
    }
}

/// A probe override for a daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSpec {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<Probe>,
}

impl Merge for ProbeSpec {
    fn merge(&self, other: &Self) -> Self {
        ProbeSpec {
            disabled: other.disabled,
            probe: other.probe.clone().or_else(|| self.probe.clone()),
        }
    }
}

/// Probe overrides keyed by component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProbeSpecMap(pub BTreeMap<String, ProbeSpec>);

impl ProbeSpecMap {
    pub fn get(&self, key: ComponentKey) -> Option<ProbeSpec> {
        lookup(&self.0, key, true)
    }
}
