//! Pure rack planning: how many members each rack should run, and which
//! single rack (if any) to mutate next.
//!
//! Nothing in here talks to the API server. The rack reconciler builds a
//! [`RackObservation`] per rack from the snapshot, asks [`plan_racks`] for a
//! decision and applies it.

use crate::sets::{self, StringSet};

/// Split `size` members over `rack_count` racks as evenly as possible.
///
/// The remainder goes to the earliest racks, so 5 over 2 racks is `[3, 2]`.
/// Negative sizes are treated as zero.
pub fn split_racks(size: i32, rack_count: usize) -> Vec<i32> {
    if rack_count == 0 {
        return Vec::new();
    }
    let size = size.max(0);
    let count = rack_count as i32;
    let base = size / count;
    let remainder = size % count;
    (0..count)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Member pod names of a StatefulSet running `replicas` ordinals.
pub fn member_names(stateful_set: &str, replicas: i32) -> StringSet {
    (0..replicas.max(0))
        .map(|ordinal| format!("{stateful_set}-{ordinal}"))
        .collect()
}

/// Seed pods: ordinal 0 of each rack in declared order, capped at `max`.
pub fn select_seeds(stateful_sets: &[String], max: usize) -> StringSet {
    stateful_sets
        .iter()
        .take(max)
        .map(|sts| format!("{sts}-0"))
        .collect()
}

/// Observed state of a rack whose StatefulSet exists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RackState {
    /// `spec.replicas` of the StatefulSet.
    pub replicas: i32,
    /// `status.readyReplicas` of the StatefulSet.
    pub ready_replicas: i32,
    /// Names of the rack's pods that currently exist.
    pub observed_members: StringSet,
    /// Names of the rack's pods that report Ready.
    pub ready_members: StringSet,
    /// Whether the StatefulSet's pod template matches the declaration.
    pub template_current: bool,
    /// Name of the StatefulSet, used to derive expected members.
    pub stateful_set: String,
}

impl RackState {
    /// Members the StatefulSet should be running right now.
    pub fn expected_members(&self) -> StringSet {
        member_names(&self.stateful_set, self.replicas)
    }

    /// Members that should exist and be ready but are not.
    pub fn missing_members(&self) -> StringSet {
        sets::subtract(&self.expected_members(), &self.ready_members)
    }

    /// Members still present beyond the current replica count.
    pub fn surplus_members(&self) -> StringSet {
        sets::subtract(&self.observed_members, &self.expected_members())
    }

    /// True while the rack has not settled on its current replica count.
    pub fn is_converging(&self) -> bool {
        self.ready_replicas < self.replicas
            || !self.missing_members().is_empty()
            || !self.surplus_members().is_empty()
    }
}

/// Everything the planner needs to know about one rack.
#[derive(Clone, Debug, PartialEq)]
pub struct RackObservation {
    pub rack: String,
    pub desired_replicas: i32,
    /// `None` when the rack's StatefulSet has not been created yet.
    pub current: Option<RackState>,
}

/// Change to apply to a single rack.
#[derive(Clone, Debug, PartialEq)]
pub enum RackAction {
    /// Create the StatefulSet with its full desired replica count.
    Create { replicas: i32 },
    /// Change the replica count.
    Scale { from: i32, to: i32 },
    /// Roll out the current pod template, keeping the replica count.
    UpdateTemplate { replicas: i32 },
}

/// Decision for one reconcile pass. At most one rack is ever mutated.
#[derive(Clone, Debug, PartialEq)]
pub enum RackPlan {
    Converged,
    /// A rack is still settling; mutate nothing until it does.
    Waiting { rack: String },
    Mutate { rack: String, action: RackAction },
}

impl RackPlan {
    pub fn is_converged(&self) -> bool {
        matches!(self, RackPlan::Converged)
    }
}

/// Decide the next rack action.
///
/// Any rack still converging blocks every mutation. Otherwise the first rack
/// in declared order that differs from its declaration gets exactly one
/// action: creation first, then replica count, then template.
pub fn plan_racks(observations: &[RackObservation]) -> RackPlan {
    if let Some(busy) = observations
        .iter()
        .find(|o| o.current.as_ref().is_some_and(RackState::is_converging))
    {
        return RackPlan::Waiting {
            rack: busy.rack.clone(),
        };
    }

    for obs in observations {
        let action = match &obs.current {
            None => Some(RackAction::Create {
                replicas: obs.desired_replicas,
            }),
            Some(state) if state.replicas != obs.desired_replicas => Some(RackAction::Scale {
                from: state.replicas,
                to: obs.desired_replicas,
            }),
            Some(state) if !state.template_current => Some(RackAction::UpdateTemplate {
                replicas: state.replicas,
            }),
            Some(_) => None,
        };
        if let Some(action) = action {
            return RackPlan::Mutate {
                rack: obs.rack.clone(),
                action,
            };
        }
    }

    RackPlan::Converged
}
