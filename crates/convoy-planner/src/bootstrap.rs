//! Bootstrap election.
//!
//! Each job has exactly one bootstrap instance, which the rest of the job
//! bootstraps against. An existing bootstrap keeps the role as long as it
//! is the only one; otherwise the lowest index takes it.

use tracing::{info, warn};

use crate::plan::InstancePlan;

/// Elect the bootstrap instance among the live plans of `job`.
///
/// Obsolete plans never take part and always come back cleared. More than
/// one existing bootstrap is an inconsistency in the recorded state; it is
/// logged and resolved by re-election, never returned as an error.
pub fn elect_bootstrap(job: &str, plans: Vec<InstancePlan>) -> Vec<InstancePlan> {
    let recorded: Vec<usize> = plans
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.obsolete && p.existing.as_ref().is_some_and(|e| e.bootstrap))
        .map(|(pos, _)| pos)
        .collect();

    if recorded.len() > 1 {
        let uuids: Vec<&str> = recorded.iter().map(|&pos| plans[pos].instance.uuid.as_str()).collect();
        warn!(job, ?uuids, "multiple existing bootstrap instances, re-electing");
    }

    let elected = match recorded.as_slice() {
        [only] => Some(*only),
        _ => plans
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.obsolete && p.desired.as_ref().is_some_and(|d| d.index.is_some()))
            .min_by_key(|(_, p)| p.instance.index)
            .map(|(pos, _)| pos),
    };

    if let Some(pos) = elected {
        let plan = &plans[pos];
        info!(job, uuid = %plan.instance.uuid, index = plan.instance.index, "elected bootstrap instance");
    }

    plans
        .into_iter()
        .enumerate()
        .map(|(pos, plan)| {
            let bootstrap = Some(pos) == elected;
            plan.with_bootstrap(bootstrap)
        })
        .collect()
}
