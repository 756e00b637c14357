//! Index assignment.
//!
//! Reused instances keep their index so their identity survives
//! reconciliation; new instances take the lowest index nobody claims.
//! When two reused instances carry the same index, the one recorded under
//! the job's own name keeps it and the other is renumbered.

use std::collections::BTreeSet;

use tracing::debug;

use convoy_core::ExistingInstance;

use crate::placed::Placed;

/// Hands out indices for one job within one reconciliation pass.
#[derive(Debug, Clone)]
pub struct IndexAssigner {
    job: String,
    claimed: BTreeSet<u32>,
}

impl IndexAssigner {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            claimed: BTreeSet::new(),
        }
    }

    /// Mark an index as taken. Returns false if it already was.
    pub fn claim(&mut self, index: u32) -> bool {
        self.claimed.insert(index)
    }

    /// Reuse the existing instance's index if it is still free, otherwise
    /// take the lowest unclaimed index.
    pub fn assign_index(&mut self, existing: Option<&ExistingInstance>) -> u32 {
        if let Some(existing) = existing {
            if self.claim(existing.index) {
                return existing.index;
            }
            debug!(job = %self.job, existing = %existing, "index already claimed, renumbering");
        }
        let next = self.lowest_free();
        self.claimed.insert(next);
        next
    }

    fn lowest_free(&self) -> u32 {
        let mut candidate = 0;
        for &index in &self.claimed {
            if index != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }
}

/// Assign an index to every desired slot of `job`.
///
/// Claims are made in a fixed order so results do not depend on slot
/// order: reused instances recorded under `job`, then obsolete instances,
/// then the remaining reused (migrated or duplicate) instances, then new
/// slots. Output keeps the input order.
pub fn assign_indexes(job: &str, placed: Vec<Placed>) -> Vec<Placed> {
    let mut assigner = IndexAssigner::new(job);
    let mut assigned: Vec<Option<u32>> = vec![None; placed.len()];

    for (pos, entry) in placed.iter().enumerate() {
        if let Placed::Existing { existing, .. } = entry {
            if existing.job_name == job && assigner.claim(existing.index) {
                assigned[pos] = Some(existing.index);
            }
        }
    }

    for entry in &placed {
        if let Placed::Obsolete(existing) = entry {
            assigner.claim(existing.index);
        }
    }

    for (pos, entry) in placed.iter().enumerate() {
        if let Placed::Existing { existing, .. } = entry {
            if assigned[pos].is_none() {
                assigned[pos] = Some(assigner.assign_index(Some(existing)));
            }
        }
    }

    for (pos, entry) in placed.iter().enumerate() {
        if entry.is_new() {
            assigned[pos] = Some(assigner.assign_index(None));
        }
    }

    placed
        .into_iter()
        .zip(assigned)
        .map(|(entry, index)| match (entry, index) {
            (Placed::New(desired), Some(index)) => Placed::New(desired.with_index(index)),
            (Placed::Existing { desired, existing }, Some(index)) => Placed::Existing {
                desired: desired.with_index(index),
                existing,
            },
            (entry, _) => entry,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::DesiredInstance;

    fn new_slot() -> Placed {
        Placed::New(DesiredInstance::new("db"))
    }

    fn reused(job: &str, index: u32) -> Placed {
        Placed::Existing {
            desired: DesiredInstance::new("db"),
            existing: ExistingInstance::new(job, index, &format!("{job}-{index}"), None),
        }
    }

    fn obsolete(index: u32) -> Placed {
        Placed::Obsolete(ExistingInstance::new("db", index, &format!("old-{index}"), None))
    }

    fn indices(placed: &[Placed], pick: fn(&Placed) -> bool) -> Vec<u32> {
        let mut out: Vec<u32> = placed.iter().filter(|p| pick(p)).filter_map(Placed::index).collect();
        out.sort_unstable();
        out
    }

    fn is_reused(p: &Placed) -> bool {
        matches!(p, Placed::Existing { .. })
    }

    #[test]
    fn only_new() {
        let placed = assign_indexes("db", vec![new_slot(), new_slot()]);
        assert_eq!(indices(&placed, Placed::is_new), vec![0, 1]);
    }

    #[test]
    fn existing_keep_unique_indices() {
        let placed = assign_indexes("db", vec![reused("db", 0), reused("db", 1)]);
        assert_eq!(indices(&placed, is_reused), vec![0, 1]);
    }

    #[test]
    fn duplicate_existing_indices_are_renumbered() {
        let placed = assign_indexes("db", vec![reused("db", 1), reused("db", 1)]);
        assert_eq!(indices(&placed, is_reused), vec![0, 1]);
    }

    #[test]
    fn obsolete_indices_stay_claimed() {
        let placed = assign_indexes("db", vec![reused("db", 1), reused("db", 1), obsolete(0), obsolete(3)]);
        assert_eq!(indices(&placed, is_reused), vec![1, 2]);
        assert_eq!(indices(&placed, Placed::is_obsolete), vec![0, 3]);
    }

    #[test]
    fn new_fill_gaps_around_existing() {
        let placed = assign_indexes("db", vec![new_slot(), new_slot(), reused("db", 1), reused("db", 2)]);
        assert_eq!(indices(&placed, Placed::is_new), vec![0, 3]);
        assert_eq!(indices(&placed, is_reused), vec![1, 2]);
    }

    #[test]
    fn conflicting_existing_then_new() {
        let placed = assign_indexes(
            "db",
            vec![
                new_slot(),
                new_slot(),
                reused("db", 1),
                reused("db", 1),
                reused("db", 1),
                reused("db", 2),
            ],
        );
        assert_eq!(indices(&placed, is_reused), vec![0, 1, 2, 3]);
        assert_eq!(indices(&placed, Placed::is_new), vec![4, 5]);
    }

    #[test]
    fn own_job_keeps_index_over_migrated() {
        let placed = assign_indexes("db", vec![reused("db_z1", 0), reused("db", 0)]);
        assert_eq!(placed[0].index(), Some(1));
        assert_eq!(placed[1].index(), Some(0));
    }

    #[test]
    fn assign_index_contract() {
        let mut assigner = IndexAssigner::new("db");
        let kept = ExistingInstance::new("db", 3, "u3", None);
        assert_eq!(assigner.assign_index(Some(&kept)), 3);
        assert_eq!(assigner.assign_index(None), 0);
        assert_eq!(assigner.assign_index(None), 1);
        assert_eq!(assigner.assign_index(Some(&kept)), 2);
        assert_eq!(assigner.assign_index(None), 4);
    }
}
