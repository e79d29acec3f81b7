use kube::ResourceExt;
use tracing::{debug, warn};

use super::racks::RackReport;
use crate::client::ClusterApi;
use crate::crds::common::Condition;
use crate::crds::{CassandraDatacenter, CassandraDatacenterStatus};
use crate::error::{OperatorError, Result};

pub const PROGRESS_READY: &str = "Ready";
pub const PROGRESS_UPDATING: &str = "Updating";

const CONDITION_READY: &str = "Ready";
const CONDITION_FAILED: &str = "ReconcileFailed";

/// Keep a condition's transition time when its status did not change.
fn make_condition(
    previous: &[Condition],
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    let last_transition_time = previous
        .iter()
        .find(|c| c.type_ == type_ && c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    Condition {
        type_: type_.into(),
        status: status.into(),
        reason: Some(reason.into()),
        message: Some(message.into()),
        last_transition_time: Some(last_transition_time),
    }
}

/// Status the datacenter should report after a successful pass.
pub fn desired_status(
    dc: &CassandraDatacenter,
    report: &RackReport,
    settled: bool,
) -> CassandraDatacenterStatus {
    let previous = dc.status.clone().unwrap_or_default();

    let ready = if settled {
        make_condition(
            &previous.conditions,
            CONDITION_READY,
            "True",
            "AllRacksReady",
            "All racks match the declared topology",
        )
    } else {
        make_condition(
            &previous.conditions,
            CONDITION_READY,
            "False",
            "RacksUpdating",
            &format!("{}/{} nodes ready", report.ready_nodes, report.desired_nodes),
        )
    };

    let mut node_replacements = previous.node_replacements;
    for pod in &report.replacements {
        if !node_replacements.contains(pod) {
            node_replacements.push(pod.clone());
        }
    }

    CassandraDatacenterStatus {
        cassandra_operator_progress: Some(
            if settled { PROGRESS_READY } else { PROGRESS_UPDATING }.into(),
        ),
        ready_nodes: report.ready_nodes,
        desired_nodes: report.desired_nodes,
        observed_generation: dc.metadata.generation,
        node_replacements,
        conditions: vec![ready],
    }
}

/// Patch the status subresource if it differs from what is stored.
/// Returns whether a write happened.
pub async fn update_status(
    api: &dyn ClusterApi,
    dc: &CassandraDatacenter,
    status: CassandraDatacenterStatus,
) -> Result<bool> {
    if dc.status.as_ref() == Some(&status) {
        debug!(name = %dc.name_any(), "Status unchanged");
        return Ok(false);
    }
    api.patch_datacenter_status(dc, &status).await?;
    Ok(true)
}

/// Record a failed pass on the datacenter. Errors are logged, never returned.
pub async fn record_failure(api: &dyn ClusterApi, dc: &CassandraDatacenter, err: &OperatorError) {
    let mut status = dc.status.clone().unwrap_or_default();
    let failed = make_condition(
        &status.conditions,
        CONDITION_FAILED,
        "True",
        "ReconcileError",
        &err.to_string(),
    );
    status.conditions.retain(|c| c.type_ != CONDITION_FAILED);
    status.conditions.push(failed);
    status.cassandra_operator_progress = Some(PROGRESS_UPDATING.into());

    if let Err(e) = update_status(api, dc, status).await {
        warn!(name = %dc.name_any(), "Failed to record reconcile failure: {e}");
    }
}
