//! Job migration.
//!
//! A desired job may list legacy jobs in `migrated_from`. Instances of
//! those legacy jobs join the desired job's candidate pool before
//! placement, so a rename reuses running instances instead of replacing
//! them.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use convoy_core::{DesiredJob, ExistingInstance};

use crate::error::{PlacementError, PlacementResult};

/// Existing instances grouped by the desired job that may reuse them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    /// Candidate pool per desired job: its own instances by index, then
    /// instances of each migration source in declaration order.
    pub candidates: BTreeMap<String, Vec<ExistingInstance>>,
    /// Instances of jobs that are neither desired nor migrated, ordered
    /// by job name then index.
    pub obsolete: Vec<ExistingInstance>,
}

impl MigrationPlan {
    /// Candidate pool of `job`; empty if nothing can be reused.
    pub fn candidates_for(&self, job: &str) -> Vec<ExistingInstance> {
        self.candidates.get(job).cloned().unwrap_or_default()
    }
}

/// Build each desired job's candidate pool, folding in migrated instances.
///
/// A migrated instance takes the AZ declared on the migration when there is
/// one and keeps its recorded AZ otherwise. It keeps its legacy job name so
/// later stages can tell it apart from the job's own instances.
pub fn migrate_jobs(jobs: &[DesiredJob], existing: &[ExistingInstance]) -> PlacementResult<MigrationPlan> {
    let desired: BTreeSet<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();
    let mut plan = MigrationPlan::default();

    for job in jobs {
        let mut pool = instances_of(existing, &job.name);

        for legacy in &job.migrated_from {
            if legacy.name == job.name {
                continue;
            }
            if desired.contains(legacy.name.as_str()) {
                return Err(PlacementError::MigrationSourceStillExists {
                    legacy: legacy.name.clone(),
                    job: job.name.clone(),
                });
            }
            if claimed.insert(legacy.name.as_str(), job.name.as_str()).is_some() {
                return Err(PlacementError::DuplicateMigrationSource {
                    legacy: legacy.name.clone(),
                    job: job.name.clone(),
                });
            }

            let migrated = instances_of(existing, &legacy.name);
            if migrated.is_empty() {
                return Err(PlacementError::UnknownMigrationSource {
                    legacy: legacy.name.clone(),
                    job: job.name.clone(),
                });
            }

            for instance in migrated {
                let instance = match legacy.az.as_deref() {
                    Some(az) => instance.with_az(Some(az)),
                    None => instance,
                };
                if !job.azs.is_empty() && instance.az.is_none() {
                    return Err(PlacementError::MigrationAzUnspecified {
                        legacy: legacy.name.clone(),
                        job: job.name.clone(),
                    });
                }
                debug!(job = %job.name, legacy = %legacy.name, instance = %instance, az = ?instance.az, "migrating instance");
                pool.push(instance);
            }
            info!(job = %job.name, legacy = %legacy.name, "migrating instance group");
        }

        plan.candidates.insert(job.name.clone(), pool);
    }

    plan.obsolete = existing
        .iter()
        .filter(|e| !desired.contains(e.job_name.as_str()) && !claimed.contains_key(e.job_name.as_str()))
        .cloned()
        .collect();
    plan.obsolete
        .sort_by(|a, b| a.job_name.cmp(&b.job_name).then(a.index.cmp(&b.index)));

    Ok(plan)
}

fn instances_of(existing: &[ExistingInstance], job: &str) -> Vec<ExistingInstance> {
    let mut found: Vec<ExistingInstance> = existing.iter().filter(|e| e.job_name == job).cloned().collect();
    found.sort_by_key(|e| e.index);
    found
}
