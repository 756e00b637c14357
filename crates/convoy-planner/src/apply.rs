//! Commits a deployment plan to the state store.
//!
//! Planning runs against a read-only snapshot of the store. Only this step
//! writes: it releases what the plan marks obsolete, deletes removed
//! instances, then records every live instance with its reservations.
//! Committing the same plan twice leaves the store unchanged the second
//! time.

use serde::Serialize;
use tracing::{debug, info};

use convoy_core::Network;
use convoy_ipam::IpProvider;
use convoy_state::StateStore;

use crate::error::PlannerResult;
use crate::planner::{DeploymentPlan, release_obsolete_reservations};

/// What one commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Live instances written.
    pub recorded: usize,
    /// Instance records removed.
    pub deleted: usize,
    /// Address rows released.
    pub released: usize,
}

/// Persist `plan` to `store`.
///
/// Reservations are re-taken through the store-backed allocators, so an
/// address another deployment claimed since planning fails the commit
/// with `AlreadyOwned` instead of being shared.
pub fn commit_plan(
    plan: &DeploymentPlan,
    networks: &[Network],
    store: &StateStore,
    max_attempts: u32,
) -> PlannerResult<CommitSummary> {
    let mut ipam = IpProvider::with_store(networks, store, max_attempts)?;
    let mut summary = CommitSummary {
        released: release_obsolete_reservations(plan, &mut ipam)?,
        ..CommitSummary::default()
    };

    for obsolete in plan.obsolete_plans() {
        let Some(existing) = &obsolete.existing else {
            continue;
        };
        if store.delete_instance(&existing.table_key())? {
            summary.deleted += 1;
        }
    }

    for live in plan.instance_plans().filter(|p| !p.is_obsolete()) {
        let az = live.instance.az.as_deref();
        for reservation in live.desired_reservations().filter(|r| r.ip.is_some()) {
            ipam.reserve(reservation.clone(), az)?;
        }

        let record = live.to_record();
        store.put_instance(&record)?;
        if let Some(existing) = &live.existing {
            let legacy = existing.table_key();
            if legacy != record.table_key() && store.delete_instance(&legacy)? {
                debug!(from = %legacy, to = %record.table_key(), "moved migrated instance record");
            }
        }
        summary.recorded += 1;
    }

    info!(
        deployment = %plan.name,
        recorded = summary.recorded,
        deleted = summary.deleted,
        released = summary.released,
        "committed plan"
    );
    Ok(summary)
}
