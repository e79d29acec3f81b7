//! Per-rack StatefulSet management, node replacement and seed labelling.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::client::ClusterApi;
use crate::constants::{annotations, defaults, labels, taints, values};
use crate::crds::CassandraDatacenter;
use crate::error::{OperatorError, Result};
use crate::metrics;
use crate::observe::ClusterSnapshot;
use crate::predicates::{
    filter_by, filter_pods_with_label, filter_pods_with_node_in, has_annotation, has_taint,
    is_pod_ready, is_pod_unschedulable, pvc_selected_node,
};
use crate::resources::statefulset_builder;
use crate::scaling::{self, RackAction, RackObservation, RackPlan, RackState};
use crate::sets::{self, StringSet};

/// What the rack reconciler did and saw during one pass.
#[derive(Clone, Debug, PartialEq)]
pub struct RackReport {
    pub plan: RackPlan,
    /// Pods deleted by the node-replacement workflow.
    pub replacements: Vec<String>,
    /// Seed label additions and removals.
    pub seed_writes: usize,
    pub ready_nodes: i32,
    pub desired_nodes: i32,
}

impl RackReport {
    /// True when this pass wrote anything.
    pub fn mutated(&self) -> bool {
        matches!(self.plan, RackPlan::Mutate { .. })
            || !self.replacements.is_empty()
            || self.seed_writes > 0
    }
}

/// Bring at most one rack closer to its declaration.
pub async fn reconcile_racks(
    api: &dyn ClusterApi,
    dc: &CassandraDatacenter,
    snapshot: &ClusterSnapshot,
) -> Result<RackReport> {
    let name = dc.name_any();
    let observations = observe_racks(dc, snapshot)?;

    let replacements = replace_unschedulable_members(api, dc, snapshot).await?;
    metrics::set_node_replacements(replacements.len());

    let plan = scaling::plan_racks(&observations);
    match &plan {
        RackPlan::Converged => debug!(name = %name, "All racks converged"),
        RackPlan::Waiting { rack } => {
            info!(name = %name, rack = %rack, "Waiting for rack to settle")
        }
        RackPlan::Mutate { rack, action } => apply_action(api, dc, rack, action).await?,
    }

    let seed_writes = if plan.is_converged() {
        reconcile_seeds(api, dc, snapshot).await?
    } else {
        0
    };

    let ready_nodes = snapshot
        .stateful_sets
        .iter()
        .filter_map(|s| s.status.as_ref().and_then(|st| st.ready_replicas))
        .sum();

    Ok(RackReport {
        plan,
        replacements,
        seed_writes,
        ready_nodes,
        desired_nodes: dc.spec.size.max(0),
    })
}

/// Build the planner's view of every declared rack.
pub fn observe_racks(
    dc: &CassandraDatacenter,
    snapshot: &ClusterSnapshot,
) -> Result<Vec<RackObservation>> {
    let racks = dc.racks();
    let desired = scaling::split_racks(dc.spec.size, racks.len());

    racks
        .iter()
        .zip(desired)
        .map(|(rack, desired_replicas)| -> Result<RackObservation> {
            let sts_name = dc.stateful_set_name(&rack.name);
            let current = match snapshot.stateful_set(&sts_name) {
                None => None,
                Some(sts) => {
                    let template = statefulset_builder::build_pod_template(dc, rack);
                    let hash = statefulset_builder::template_hash(&template)?;
                    Some(rack_state(sts, &sts_name, &hash, snapshot.rack_pods(&rack.name)))
                }
            };
            Ok(RackObservation {
                rack: rack.name.clone(),
                desired_replicas,
                current,
            })
        })
        .collect()
}

fn rack_state(sts: &StatefulSet, sts_name: &str, desired_hash: &str, pods: Vec<&Pod>) -> RackState {
    let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready_replicas = sts
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    let template_current = sts.annotations().get(annotations::RESOURCE_HASH).map(String::as_str)
        == Some(desired_hash);

    RackState {
        replicas,
        ready_replicas,
        observed_members: sets::pod_names(pods.iter().copied()),
        ready_members: sets::pod_names(pods.iter().copied().filter(|p| is_pod_ready(p))),
        template_current,
        stateful_set: sts_name.to_string(),
    }
}

async fn apply_action(
    api: &dyn ClusterApi,
    dc: &CassandraDatacenter,
    rack_name: &str,
    action: &RackAction,
) -> Result<()> {
    let name = dc.name_any();
    let namespace = dc.namespace_or_default();
    let sts_name = dc.stateful_set_name(rack_name);
    let rack = dc
        .racks()
        .into_iter()
        .find(|r| r.name == rack_name)
        .ok_or_else(|| OperatorError::NotFound(format!("rack {rack_name}")))?;

    match *action {
        RackAction::Create { replicas } => {
            info!(name = %name, rack = %rack_name, replicas, "Creating rack StatefulSet");
            let sts = statefulset_builder::build_rack_stateful_set(dc, &rack, replicas)?;
            api.create_stateful_set(&sts).await
        }
        RackAction::Scale { from, to } => {
            info!(name = %name, rack = %rack_name, from, to, "Scaling rack");
            api.scale_stateful_set(&namespace, &sts_name, to).await
        }
        RackAction::UpdateTemplate { replicas } => {
            info!(name = %name, rack = %rack_name, "Rolling out updated pod template");
            let sts = statefulset_builder::build_rack_stateful_set(dc, &rack, replicas)?;
            api.patch_stateful_set(&sts).await
        }
    }
}

/// Recover members stuck unschedulable because of where their claim is bound.
///
/// A member whose claim is bound to a node that no longer exists is deleted
/// together with its claim, so the StatefulSet provisions fresh storage. A
/// member whose claim is bound to a node carrying the drain taint is deleted
/// and its claim unbound, so it can be placed elsewhere. Members on a viable
/// node, or with no recorded node, are left alone. Returns the names of the
/// pods deleted.
///
/// The pod is always deleted before its claim is touched. The claim keeps
/// its node binding until the last write succeeds, so a pass that fails
/// part-way finds the same member stuck next time and repeats the work.
pub async fn replace_unschedulable_members(
    api: &dyn ClusterApi,
    dc: &CassandraDatacenter,
    snapshot: &ClusterSnapshot,
) -> Result<Vec<String>> {
    let namespace = dc.namespace_or_default();

    // (pod, claim, node the claim is bound to) for every stuck member.
    let stuck: Vec<(String, String, String)> = filter_by(&snapshot.pods, |p| {
        is_pod_unschedulable(p) && p.metadata.deletion_timestamp.is_none()
    })
    .into_iter()
    .filter_map(|pod| {
        let pod_name = pod.name_any();
        let claim = snapshot.claim_for_pod(&pod_name)?;
        if !has_annotation(&claim.metadata, annotations::SELECTED_NODE) {
            debug!(pod = %pod_name, "Unschedulable member has no node-bound claim");
            return None;
        }
        let node = pvc_selected_node(claim)?.to_string();
        Some((pod_name, claim.name_any(), node))
    })
    .collect();
    if stuck.is_empty() {
        return Ok(Vec::new());
    }

    let mut gone = StringSet::new();
    let mut drained = StringSet::new();
    for node_name in sets::from_names(stuck.iter().map(|(_, _, node)| node.as_str())) {
        match api.get_node(&node_name).await? {
            None => {
                gone.insert(node_name);
            }
            Some(node)
                if has_taint(
                    &node,
                    taints::DRAIN_KEY,
                    taints::DRAIN_VALUE,
                    taints::DRAIN_EFFECT,
                ) =>
            {
                drained.insert(node_name);
            }
            Some(_) => {}
        }
    }
    let still_running = filter_pods_with_node_in(&snapshot.pods, &drained);
    if !still_running.is_empty() {
        debug!(
            members = ?sets::pod_names(still_running),
            "Members still running on draining nodes"
        );
    }

    let mut replaced = Vec::new();
    for (pod_name, claim_name, node_name) in stuck {
        if gone.contains(&node_name) {
            warn!(pod = %pod_name, node = %node_name, "Node gone, replacing member storage");
            api.delete_pod(&namespace, &pod_name).await?;
            api.delete_pvc(&namespace, &claim_name).await?;
        } else if drained.contains(&node_name) {
            warn!(pod = %pod_name, node = %node_name, "Node draining, unbinding member storage");
            api.delete_pod(&namespace, &pod_name).await?;
            api.clear_selected_node(&namespace, &claim_name).await?;
        } else {
            debug!(pod = %pod_name, node = %node_name, "Unschedulable member on viable node");
            continue;
        }
        replaced.push(pod_name);
    }

    Ok(replaced)
}

/// Label the ordinal-0 member of each rack as a seed and unlabel the rest.
async fn reconcile_seeds(
    api: &dyn ClusterApi,
    dc: &CassandraDatacenter,
    snapshot: &ClusterSnapshot,
) -> Result<usize> {
    let namespace = dc.namespace_or_default();
    let stateful_sets: Vec<String> = dc
        .racks()
        .iter()
        .map(|r| dc.stateful_set_name(&r.name))
        .collect();

    let existing = sets::pod_names(&snapshot.pods);
    let wanted = sets::intersect(
        &scaling::select_seeds(&stateful_sets, defaults::MAX_SEEDS),
        &existing,
    );
    let labelled = sets::pod_names(filter_pods_with_label(
        &snapshot.pods,
        labels::SEED_NODE,
        values::SEED_NODE,
    ));

    let mut writes = 0;
    for pod in sets::subtract(&wanted, &labelled) {
        info!(pod = %pod, "Labelling seed");
        api.set_seed_label(&namespace, &pod, true).await?;
        writes += 1;
    }
    for pod in sets::subtract(&labelled, &wanted) {
        info!(pod = %pod, "Removing seed label");
        api.set_seed_label(&namespace, &pod, false).await?;
        writes += 1;
    }
    Ok(writes)
}
