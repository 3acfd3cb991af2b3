//! Placement sub-spec
//!
//! A placement bundles node affinity, pod affinity and anti-affinity,
//! tolerations and topology spread constraints. Placements layer on top of
//! each other (`all` under a component) and are applied onto pod specs.

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, PodAffinity,
    PodAntiAffinity, PodSpec, Toleration, TopologySpreadConstraint,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::keyed::Merge;

/// Scheduling constraints for a component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<NodeAffinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_affinity: Option<PodAffinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_anti_affinity: Option<PodAntiAffinity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,
}

impl Merge for Placement {
    /// Pieces set on `other` replace those on `self`; tolerations accumulate.
    fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        if other.node_affinity.is_some() {
            out.node_affinity = other.node_affinity.clone();
        }
        if other.pod_affinity.is_some() {
            out.pod_affinity = other.pod_affinity.clone();
        }
        if other.pod_anti_affinity.is_some() {
            out.pod_anti_affinity = other.pod_anti_affinity.clone();
        }
        merge_tolerations(&mut out.tolerations, &other.tolerations);
        if !other.topology_spread_constraints.is_empty() {
            out.topology_spread_constraints = other.topology_spread_constraints.clone();
        }
        out
    }
}

impl Placement {
    pub fn is_empty(&self) -> bool {
        self == &Placement::default()
    }

    /// Apply the placement onto a pod spec, keeping what the pod already has
    pub fn apply_to_pod_spec(&self, pod: &mut PodSpec) {
        if self.node_affinity.is_some() || self.pod_affinity.is_some() || self.pod_anti_affinity.is_some() {
            let affinity = pod.affinity.get_or_insert_with(Affinity::default);

            if let Some(node_affinity) = &self.node_affinity {
                affinity.node_affinity = Some(merge_node_affinity(
                    affinity.node_affinity.take(),
                    node_affinity,
                ));
            }
            if self.pod_affinity.is_some() {
                affinity.pod_affinity = self.pod_affinity.clone();
            }
            if self.pod_anti_affinity.is_some() {
                affinity.pod_anti_affinity = self.pod_anti_affinity.clone();
            }
        }

        if !self.tolerations.is_empty() {
            let tolerations = pod.tolerations.get_or_insert_with(Vec::new);
            merge_tolerations(tolerations, &self.tolerations);
        }

        if !self.topology_spread_constraints.is_empty() {
            pod.topology_spread_constraints = Some(self.topology_spread_constraints.clone());
        }
    }
}

fn same_toleration(a: &Toleration, b: &Toleration) -> bool {
    a.key == b.key && a.operator == b.operator && a.value == b.value
}

/// Append tolerations from `extra` that are not already in `target`
pub fn merge_tolerations(target: &mut Vec<Toleration>, extra: &[Toleration]) {
    for t in extra {
        if !target.iter().any(|existing| same_toleration(existing, t)) {
            target.push(t.clone());
        }
    }
}

fn same_requirement(a: &NodeSelectorRequirement, b: &NodeSelectorRequirement) -> bool {
    a.key == b.key && a.operator == b.operator
}

/// Requirements from `first` followed by those from `second` not already present
fn union_requirements(
    first: Option<Vec<NodeSelectorRequirement>>,
    second: Option<Vec<NodeSelectorRequirement>>,
) -> Option<Vec<NodeSelectorRequirement>> {
    match (first, second) {
        (None, None) => None,
        (Some(f), None) => Some(f),
        (None, Some(s)) => Some(s),
        (Some(mut f), Some(s)) => {
            for req in s {
                if !f.iter().any(|existing| same_requirement(existing, &req)) {
                    f.push(req);
                }
            }
            Some(f)
        }
    }
}

fn merge_node_affinity(existing: Option<NodeAffinity>, add: &NodeAffinity) -> NodeAffinity {
    let Some(mut result) = existing else {
        return add.clone();
    };

    if let Some(preferred) = &add.preferred_during_scheduling_ignored_during_execution {
        result
            .preferred_during_scheduling_ignored_during_execution
            .get_or_insert_with(Vec::new)
            .extend(preferred.iter().cloned());
    }

    let Some(add_required) = &add.required_during_scheduling_ignored_during_execution else {
        return result;
    };
    let Some(add_term) = add_required.node_selector_terms.first() else {
        return result;
    };

    match result
        .required_during_scheduling_ignored_during_execution
        .as_mut()
    {
        None => {
            result.required_during_scheduling_ignored_during_execution = Some(add_required.clone());
        }
        Some(NodeSelector { node_selector_terms }) if node_selector_terms.is_empty() => {
            *node_selector_terms = add_required.node_selector_terms.clone();
        }
        Some(NodeSelector { node_selector_terms }) => {
            let current = &mut node_selector_terms[0];
            let merged = NodeSelectorTerm {
                match_expressions: union_requirements(
                    add_term.match_expressions.clone(),
                    current.match_expressions.take(),
                ),
                match_fields: union_requirements(
                    add_term.match_fields.clone(),
                    current.match_fields.take(),
                ),
            };
            *current = merged;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodAffinityTerm, PreferredSchedulingTerm};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn requirement(key: &str, op: &str, values: &[&str]) -> NodeSelectorRequirement {
        NodeSelectorRequirement {
            key: key.into(),
            operator: op.into(),
            values: Some(values.iter().map(|v| v.to_string()).collect()),
        }
    }

    fn required(reqs: Vec<NodeSelectorRequirement>) -> NodeAffinity {
        NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(reqs),
                    match_fields: None,
                }],
            }),
            preferred_during_scheduling_ignored_during_execution: None,
        }
    }

    fn toleration(key: &str) -> Toleration {
        Toleration {
            key: Some(key.into()),
            operator: Some("Exists".into()),
            ..Default::default()
        }
    }

    fn anti_affinity(label: &str) -> PodAntiAffinity {
        PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_labels: Some([("app".to_string(), label.to_string())].into()),
                    ..Default::default()
                }),
                topology_key: "kubernetes.io/hostname".into(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_replaces_pieces() {
        let base = Placement {
            node_affinity: Some(required(vec![requirement("role", "In", &["storage"])])),
            tolerations: vec![toleration("foo")],
            ..Default::default()
        };
        let over = Placement {
            pod_anti_affinity: Some(anti_affinity("mon")),
            tolerations: vec![toleration("bar"), toleration("foo")],
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.node_affinity, base.node_affinity);
        assert_eq!(merged.pod_anti_affinity, Some(anti_affinity("mon")));
        assert_eq!(merged.tolerations, vec![toleration("foo"), toleration("bar")]);

        let over = Placement {
            node_affinity: Some(required(vec![requirement("zone", "In", &["a"])])),
            ..Default::default()
        };
        let merged = base.merge(&over);
        assert_eq!(merged.node_affinity, over.node_affinity);
        assert_eq!(merged.tolerations, base.tolerations);
    }

    #[test]
    fn test_apply_to_empty_pod() {
        let placement = Placement {
            node_affinity: Some(required(vec![requirement("role", "In", &["storage"])])),
            tolerations: vec![toleration("foo")],
            topology_spread_constraints: vec![TopologySpreadConstraint {
                max_skew: 1,
                topology_key: "zone".into(),
                when_unsatisfiable: "DoNotSchedule".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut pod = PodSpec::default();
        placement.apply_to_pod_spec(&mut pod);

        let affinity = pod.affinity.unwrap();
        assert_eq!(affinity.node_affinity, placement.node_affinity);
        assert_eq!(pod.tolerations.unwrap(), vec![toleration("foo")]);
        assert_eq!(pod.topology_spread_constraints.unwrap().len(), 1);
    }

    #[test]
    fn test_apply_unions_required_expressions() {
        let mut pod = PodSpec {
            affinity: Some(Affinity {
                node_affinity: Some(required(vec![
                    requirement("role", "In", &["old"]),
                    requirement("disk", "Exists", &[]),
                ])),
                ..Default::default()
            }),
            tolerations: Some(vec![toleration("foo")]),
            ..Default::default()
        };
        let placement = Placement {
            node_affinity: Some(NodeAffinity {
                preferred_during_scheduling_ignored_during_execution: Some(vec![
                    PreferredSchedulingTerm {
                        weight: 10,
                        preference: NodeSelectorTerm::default(),
                    },
                ]),
                ..required(vec![requirement("role", "In", &["new"])])
            }),
            tolerations: vec![toleration("foo"), toleration("bar")],
            ..Default::default()
        };

        placement.apply_to_pod_spec(&mut pod);

        let node_affinity = pod.affinity.unwrap().node_affinity.unwrap();
        let exprs = node_affinity
            .required_during_scheduling_ignored_during_execution
            .unwrap()
            .node_selector_terms[0]
            .match_expressions
            .clone()
            .unwrap();
        assert_eq!(
            exprs,
            vec![
                requirement("role", "In", &["new"]),
                requirement("disk", "Exists", &[]),
            ]
        );
        assert_eq!(
            node_affinity
                .preferred_during_scheduling_ignored_during_execution
                .unwrap()
                .len(),
            1
        );
        assert_eq!(pod.tolerations.unwrap(), vec![toleration("foo"), toleration("bar")]);
    }

    #[test]
    fn test_apply_overwrites_anti_affinity() {
        let mut pod = PodSpec {
            affinity: Some(Affinity {
                pod_anti_affinity: Some(anti_affinity("old")),
                ..Default::default()
            }),
            ..Default::default()
        };
        let placement = Placement {
            pod_anti_affinity: Some(anti_affinity("osd")),
            ..Default::default()
        };
        placement.apply_to_pod_spec(&mut pod);
        assert_eq!(
            pod.affinity.unwrap().pod_anti_affinity,
            Some(anti_affinity("osd"))
        );
    }
}
