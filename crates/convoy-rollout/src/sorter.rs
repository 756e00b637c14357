//! Deterministic rollout order for the plans of one job.
//!
//! The bootstrap instance goes first. Its AZ-mates follow, then instances
//! without an AZ, then every other AZ in ascending name order. Within a
//! group, plans are ordered by `"job_name/uuid"`.

use std::collections::BTreeMap;

use tracing::debug;

/// What the sorter needs to know about a plan.
pub trait RolloutUnit {
    fn job_name(&self) -> &str;
    fn uuid(&self) -> &str;
    fn az(&self) -> Option<&str>;
    fn is_bootstrap(&self) -> bool;
    fn is_obsolete(&self) -> bool;
}

/// Tie-break key within an AZ group.
pub fn rollout_key<T: RolloutUnit + ?Sized>(unit: &T) -> String {
    format!("{}/{}", unit.job_name(), unit.uuid())
}

/// Order `units` for rollout, leaving out obsolete ones.
///
/// If several units claim bootstrap, the one with the lowest key leads and
/// the others are placed by AZ like any other unit. With no bootstrap the
/// unzoned group comes first, then AZs ascending.
pub fn sort_for_rollout<T: RolloutUnit>(units: &[T]) -> Vec<&T> {
    let mut live: Vec<&T> = units.iter().filter(|u| !u.is_obsolete()).collect();
    live.sort_by_cached_key(|u| rollout_key(*u));

    let bootstrap_pos = live.iter().position(|u| u.is_bootstrap());
    let mut ordered = Vec::with_capacity(live.len());
    let bootstrap_az = match bootstrap_pos {
        Some(pos) => {
            let bootstrap = live.remove(pos);
            ordered.push(bootstrap);
            bootstrap.az()
        }
        None => None,
    };

    // Keys sort None before Some, giving unzoned then AZs ascending.
    let mut groups: BTreeMap<Option<&str>, Vec<&T>> = BTreeMap::new();
    for unit in live {
        groups.entry(unit.az()).or_default().push(unit);
    }

    if let Some(az) = bootstrap_az {
        if let Some(mates) = groups.remove(&Some(az)) {
            ordered.extend(mates);
        }
    }
    for (_, group) in groups {
        ordered.extend(group);
    }

    debug!(count = ordered.len(), bootstrap_az = ?bootstrap_az, "ordered plans for rollout");
    ordered
}
