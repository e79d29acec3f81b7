//! Per-event reconciliation of a CassandraDatacenter.
//!
//! [`Reconciler::reconcile`] looks the datacenter up, gathers a snapshot and
//! hands both to [`Reconciler::run_steps`], which runs the deletion gate, the
//! Service reconciler and the rack reconciler in that order.

pub mod deletion;
pub mod racks;
pub mod services;
pub mod status;

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{info, warn};

use crate::client::ClusterApi;
use crate::crds::CassandraDatacenter;
use crate::error::Result;
use crate::observe::{self, ClusterSnapshot};

use deletion::Gate;

/// Successful result of one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the next change event.
    Done,
    /// Something changed or is still converging; look again soon.
    Requeue,
}

/// What the work queue should do with the object after a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Done,
    RequeueNow,
    RequeueAfterError,
}

impl From<&Result<Outcome>> for Verdict {
    fn from(result: &Result<Outcome>) -> Self {
        match result {
            Ok(Outcome::Done) => Verdict::Done,
            Ok(Outcome::Requeue) => Verdict::RequeueNow,
            Err(_) => Verdict::RequeueAfterError,
        }
    }
}

/// Drives one datacenter toward its declaration through a [`ClusterApi`].
#[derive(Clone)]
pub struct Reconciler {
    api: Arc<dyn ClusterApi>,
}

impl Reconciler {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }

    /// Entry point for one event on `namespace/name`.
    ///
    /// A datacenter that no longer exists is `Done` without any write. Any
    /// failure is returned to the caller after a best-effort attempt to
    /// record it on the datacenter's status.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let Some(dc) = self.api.get_datacenter(namespace, name).await? else {
            info!(name = %name, namespace = %namespace, "CassandraDatacenter not found, ignoring");
            return Ok(Outcome::Done);
        };

        let result = match observe::gather(self.api.as_ref(), &dc).await {
            Ok(snapshot) => self.run_steps(&dc, &snapshot).await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            warn!(name = %name, namespace = %namespace, "Reconciliation failed: {e}");
            if !dc.is_being_deleted() {
                status::record_failure(self.api.as_ref(), &dc, e).await;
            }
        }
        result
    }

    /// Run the reconciliation steps against an already gathered snapshot.
    pub async fn run_steps(
        &self,
        dc: &CassandraDatacenter,
        snapshot: &ClusterSnapshot,
    ) -> Result<Outcome> {
        let api = self.api.as_ref();

        if let Gate::Stop(outcome) = deletion::gate(api, dc, snapshot).await? {
            return Ok(outcome);
        }

        let service_writes = services::reconcile_services(api, dc, snapshot).await?;
        let report = racks::reconcile_racks(api, dc, snapshot).await?;

        let settled = service_writes == 0 && !report.mutated() && report.plan.is_converged();
        status::update_status(api, dc, status::desired_status(dc, &report, settled)).await?;

        info!(
            name = %dc.name_any(),
            service_writes,
            plan = ?report.plan,
            replacements = report.replacements.len(),
            settled,
            "Reconciled CassandraDatacenter"
        );

        Ok(if settled {
            Outcome::Done
        } else {
            Outcome::Requeue
        })
    }
}
