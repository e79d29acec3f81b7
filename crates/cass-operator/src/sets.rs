//! Name-set algebra used to diff desired identifiers against observed ones.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;

/// An unordered collection of resource names.
///
/// Backed by a `BTreeSet` so iteration (and therefore the order in which
/// corrective writes are issued) is deterministic.
pub type StringSet = BTreeSet<String>;

/// Names present in either set.
pub fn union(a: &StringSet, b: &StringSet) -> StringSet {
    a.union(b).cloned().collect()
}

/// Names in `a` that are not in `b`.
pub fn subtract(a: &StringSet, b: &StringSet) -> StringSet {
    a.difference(b).cloned().collect()
}

/// Names present in both sets.
pub fn intersect(a: &StringSet, b: &StringSet) -> StringSet {
    a.intersection(b).cloned().collect()
}

/// Build a set from anything yielding string-like names.
pub fn from_names<I, S>(names: I) -> StringSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

pub fn pod_names<'a>(pods: impl IntoIterator<Item = &'a Pod>) -> StringSet {
    pods.into_iter().map(|p| p.name_any()).collect()
}

/// Nodes the given pods are scheduled on. Unscheduled pods contribute nothing.
pub fn pod_node_names<'a>(pods: impl IntoIterator<Item = &'a Pod>) -> StringSet {
    pods.into_iter()
        .filter_map(|p| p.spec.as_ref()?.node_name.clone())
        .collect()
}

pub fn node_names<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> StringSet {
    nodes.into_iter().map(|n| n.name_any()).collect()
}
