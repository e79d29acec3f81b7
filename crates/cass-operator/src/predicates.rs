//! Pure predicates over single observed resources, plus one generic filter.

use k8s_openapi::api::core::v1::{Node, PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::constants::annotations;
use crate::sets::StringSet;

/// Keep the items matching `predicate`, preserving order.
pub fn filter_by<'a, T, F>(items: &'a [T], predicate: F) -> Vec<&'a T>
where
    F: Fn(&T) -> bool,
{
    items.iter().filter(|item| predicate(*item)).collect()
}

/// True when the node carries a taint with exactly this key, value and effect.
pub fn has_taint(node: &Node, key: &str, value: &str, effect: &str) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| {
            taints.iter().any(|t| {
                t.key == key && t.effect == effect && t.value.as_deref().unwrap_or("") == value
            })
        })
        .unwrap_or(false)
}

/// True only when the scheduler reported it could not place the pod.
pub fn is_pod_unschedulable(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds.iter().any(|c| {
                c.type_ == "PodScheduled"
                    && c.status == "False"
                    && c.reason.as_deref() == Some("Unschedulable")
            })
        })
        .unwrap_or(false)
}

/// True when the pod reports the `Ready` condition.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

pub fn has_annotation(meta: &ObjectMeta, key: &str) -> bool {
    meta.annotations
        .as_ref()
        .map(|a| a.contains_key(key))
        .unwrap_or(false)
}

pub fn label_equals(meta: &ObjectMeta, key: &str, value: &str) -> bool {
    meta.labels
        .as_ref()
        .and_then(|l| l.get(key))
        .map(|v| v == value)
        .unwrap_or(false)
}

/// Node recorded on the claim by the scheduler, if any.
pub fn pvc_selected_node(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::SELECTED_NODE))
        .map(String::as_str)
        .filter(|n| !n.is_empty())
}

pub fn filter_nodes_with_taint<'a>(
    nodes: &'a [Node],
    key: &str,
    value: &str,
    effect: &str,
) -> Vec<&'a Node> {
    filter_by(nodes, |n| has_taint(n, key, value, effect))
}

pub fn filter_pods_with_label<'a>(pods: &'a [Pod], key: &str, value: &str) -> Vec<&'a Pod> {
    filter_by(pods, |p| label_equals(&p.metadata, key, value))
}

pub fn filter_pods_with_annotation<'a>(pods: &'a [Pod], key: &str) -> Vec<&'a Pod> {
    filter_by(pods, |p| has_annotation(&p.metadata, key))
}

/// Pods scheduled on one of `nodes`.
pub fn filter_pods_with_node_in<'a>(pods: &'a [Pod], nodes: &StringSet) -> Vec<&'a Pod> {
    filter_by(pods, |p| {
        p.spec
            .as_ref()
            .and_then(|s| s.node_name.as_ref())
            .is_some_and(|n| nodes.contains(n))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, PodCondition, PodSpec, PodStatus, Taint};
    use std::collections::BTreeMap;

    fn node(name: &str, taints: Vec<Taint>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                taints: Some(taints),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn taint(key: &str, value: Option<&str>, effect: &str) -> Taint {
        Taint {
            key: key.into(),
            value: value.map(Into::into),
            effect: effect.into(),
            ..Default::default()
        }
    }

    fn pod_with_condition(name: &str, type_: &str, status: &str, reason: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: type_.into(),
                    status: status.into(),
                    reason: reason.map(Into::into),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_has_taint_requires_all_three() {
        let n = node("n1", vec![taint("node.vmware.com/drain", Some("drain"), "NoSchedule")]);
        assert!(has_taint(&n, "node.vmware.com/drain", "drain", "NoSchedule"));
        assert!(!has_taint(&n, "node.vmware.com/drain", "planned-downtime", "NoSchedule"));
        assert!(!has_taint(&n, "node.vmware.com/drain", "drain", "NoExecute"));
        assert!(!has_taint(&n, "other", "drain", "NoSchedule"));
    }

    #[test]
    fn test_has_taint_without_taints() {
        let n = Node::default();
        assert!(!has_taint(&n, "k", "v", "NoSchedule"));
    }

    #[test]
    fn test_filter_nodes_with_taint_preserves_order() {
        let nodes = vec![
            node("a", vec![taint("k", Some("v"), "NoSchedule")]),
            node("b", vec![]),
            node("c", vec![taint("k", Some("v"), "NoSchedule")]),
        ];
        let names: Vec<_> = filter_nodes_with_taint(&nodes, "k", "v", "NoSchedule")
            .into_iter()
            .map(|n| n.metadata.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_pod_unschedulable() {
        let p = pod_with_condition("p", "PodScheduled", "False", Some("Unschedulable"));
        assert!(is_pod_unschedulable(&p));

        // Other failure modes do not count.
        let p = pod_with_condition("p", "PodScheduled", "False", Some("SchedulerError"));
        assert!(!is_pod_unschedulable(&p));
        let p = pod_with_condition("p", "Ready", "False", Some("Unschedulable"));
        assert!(!is_pod_unschedulable(&p));
        assert!(!is_pod_unschedulable(&Pod::default()));
    }

    #[test]
    fn test_pod_ready() {
        assert!(is_pod_ready(&pod_with_condition("p", "Ready", "True", None)));
        assert!(!is_pod_ready(&pod_with_condition("p", "Ready", "False", None)));
    }

    #[test]
    fn test_annotation_and_label_filters() {
        let mut a = Pod::default();
        a.metadata.name = Some("a".into());
        a.metadata.annotations = Some(BTreeMap::from([("x".into(), "1".into())]));
        a.metadata.labels = Some(BTreeMap::from([("rack".into(), "r1".into())]));
        let mut b = Pod::default();
        b.metadata.name = Some("b".into());
        b.metadata.labels = Some(BTreeMap::from([("rack".into(), "r2".into())]));
        let pods = vec![a, b];

        assert!(has_annotation(&pods[0].metadata, "x"));
        assert!(!has_annotation(&pods[1].metadata, "x"));
        let r2 = filter_pods_with_label(&pods, "rack", "r2");
        assert_eq!(r2.len(), 1);
        assert_eq!(r2[0].metadata.name.as_deref(), Some("b"));
        assert!(filter_pods_with_label(&pods, "missing", "r1").is_empty());

        let annotated = filter_pods_with_annotation(&pods, "x");
        assert_eq!(annotated.len(), 1);
        assert_eq!(annotated[0].metadata.name.as_deref(), Some("a"));
        assert!(filter_pods_with_annotation(&pods, "y").is_empty());
    }

    #[test]
    fn test_filter_pods_with_node_in() {
        let on = |name: &str, node: Option<&str>| Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: node.map(Into::into),
                ..Default::default()
            }),
            ..Default::default()
        };
        let pods = vec![on("a", Some("n1")), on("b", None), on("c", Some("n2"))];
        let nodes = crate::sets::from_names(["n2", "n3"]);

        let found = filter_pods_with_node_in(&pods, &nodes);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.name.as_deref(), Some("c"));
        assert!(filter_pods_with_node_in(&pods, &StringSet::new()).is_empty());
    }

    #[test]
    fn test_pvc_selected_node() {
        let mut pvc = PersistentVolumeClaim::default();
        assert_eq!(pvc_selected_node(&pvc), None);
        pvc.metadata.annotations = Some(BTreeMap::from([(
            annotations::SELECTED_NODE.into(),
            "node-7".into(),
        )]));
        assert_eq!(pvc_selected_node(&pvc), Some("node-7"));
    }
}
