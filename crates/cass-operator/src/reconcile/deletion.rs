//! Finalizer protocol for CassandraDatacenter deletion.
//!
//! Storage claims outlive their pods, so the datacenter keeps a finalizer
//! until every PVC it owns has been deleted.

use kube::ResourceExt;
use tracing::{info, warn};

use super::Outcome;
use crate::client::ClusterApi;
use crate::constants::FINALIZER;
use crate::crds::CassandraDatacenter;
use crate::error::Result;
use crate::observe::ClusterSnapshot;

/// Lifecycle position of a datacenter, from (finalizer present, deletion requested).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionState {
    /// No finalizer, not being deleted.
    Unguarded,
    /// Finalizer present, not being deleted.
    Guarded,
    /// Finalizer present, deletion requested.
    Finalizing,
    /// Deletion requested and the finalizer is already gone.
    Released,
}

/// What the gate has to do for a given state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletionStep {
    AddFinalizer,
    Proceed,
    Cleanup,
    Release,
}

/// Result of running the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    /// Continue with normal reconciliation.
    Proceed,
    /// Stop here with the given outcome.
    Stop(Outcome),
}

impl DeletionState {
    pub fn of(dc: &CassandraDatacenter) -> Self {
        match (dc.has_finalizer(), dc.is_being_deleted()) {
            (false, false) => DeletionState::Unguarded,
            (true, false) => DeletionState::Guarded,
            (true, true) => DeletionState::Finalizing,
            (false, true) => DeletionState::Released,
        }
    }

    pub fn step(self) -> DeletionStep {
        match self {
            DeletionState::Unguarded => DeletionStep::AddFinalizer,
            DeletionState::Guarded => DeletionStep::Proceed,
            DeletionState::Finalizing => DeletionStep::Cleanup,
            DeletionState::Released => DeletionStep::Release,
        }
    }
}

/// Run the deletion gate for `dc`.
///
/// Claims are deleted before the finalizer is removed; if any claim deletion
/// fails the finalizer stays and the error propagates.
pub async fn gate(
    api: &dyn ClusterApi,
    dc: &CassandraDatacenter,
    snapshot: &ClusterSnapshot,
) -> Result<Gate> {
    let name = dc.name_any();
    let namespace = dc.namespace_or_default();

    match DeletionState::of(dc).step() {
        DeletionStep::Proceed => Ok(Gate::Proceed),
        DeletionStep::AddFinalizer => {
            let mut finalizers = dc.finalizers().to_vec();
            finalizers.push(FINALIZER.to_string());
            api.set_finalizers(dc, finalizers).await?;
            info!(name = %name, namespace = %namespace, "Added finalizer");
            Ok(Gate::Stop(Outcome::Requeue))
        }
        DeletionStep::Cleanup => {
            info!(name = %name, namespace = %namespace, claims = snapshot.pvcs.len(), "Cleaning up datacenter storage");
            for pvc in &snapshot.pvcs {
                let claim = pvc.name_any();
                if let Err(e) = api.delete_pvc(&namespace, &claim).await {
                    warn!(name = %name, claim = %claim, "Failed to delete PVC: {e}");
                    return Err(e);
                }
            }
            let finalizers = dc
                .finalizers()
                .iter()
                .filter(|f| f.as_str() != FINALIZER)
                .cloned()
                .collect();
            api.set_finalizers(dc, finalizers).await?;
            info!(name = %name, namespace = %namespace, "Removed finalizer");
            Ok(Gate::Stop(Outcome::Done))
        }
        DeletionStep::Release => Ok(Gate::Stop(Outcome::Done)),
    }
}
