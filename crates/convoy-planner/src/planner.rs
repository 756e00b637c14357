//! Deployment planner: one reconciliation pass over a deployment.
//!
//! ```text
//! migrate_jobs ─► place_by_zone / place_by_static_ips ─► assign_indexes
//!      ─► InstancePlanFactory ─► elect_bootstrap ─► sort_for_rollout ─► plan_batches
//! ```
//!
//! Planning is synchronous and deterministic for a given repository and
//! reservation state. Only the agent-state fetch that feeds it is async.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use convoy_core::{
    ConvoyConfig, DeploymentManifest, DesiredJob, ExistingInstance, Network, UpdateConfig,
};
use convoy_ipam::{IpProvider, IpamError};
use convoy_placement::{assign_indexes, migrate_jobs, place_by_static_ips, place_by_zone};
use convoy_rollout::{UpdateBatch, plan_batches, sort_for_rollout};

use crate::bootstrap::elect_bootstrap;
use crate::error::PlannerResult;
use crate::factory::InstancePlanFactory;
use crate::plan::InstancePlan;
use crate::repository::InstanceRepository;
use crate::snapshot::{AgentState, AgentStateSource, fetch_agent_states};

/// Everything one pass reads about a deployment. Jobs and instances refer
/// to each other by name.
#[derive(Debug, Clone, Default)]
pub struct DeploymentContext {
    pub name: String,
    pub networks: Vec<Network>,
    pub jobs: Vec<DesiredJob>,
    pub existing: Vec<ExistingInstance>,
    /// Overrides the process-wide update settings when set.
    pub update: Option<UpdateConfig>,
}

impl DeploymentContext {
    pub fn from_manifest(manifest: &DeploymentManifest) -> Self {
        Self {
            name: manifest.name.clone(),
            networks: manifest.networks.clone(),
            jobs: manifest.jobs.clone(),
            existing: manifest.existing.clone(),
            update: manifest.update,
        }
    }

    pub fn job(&self, name: &str) -> Option<&DesiredJob> {
        self.jobs.iter().find(|j| j.name == name)
    }
}

/// Plans of one desired job.
#[derive(Debug, Clone, Serialize)]
pub struct JobPlan {
    pub name: String,
    /// Live plans in rollout order, bootstrap first.
    pub plans: Vec<InstancePlan>,
    /// Instances of this job that are deleted.
    pub obsolete: Vec<InstancePlan>,
    /// Uuids of `plans`, split into update batches.
    pub batches: Vec<UpdateBatch<String>>,
}

impl JobPlan {
    pub fn bootstrap(&self) -> Option<&InstancePlan> {
        self.plans.iter().find(|p| p.is_bootstrap())
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPlan {
    pub name: String,
    pub jobs: Vec<JobPlan>,
    /// Instances of jobs that are no longer desired.
    pub obsolete: Vec<InstancePlan>,
}

impl DeploymentPlan {
    pub fn job(&self, name: &str) -> Option<&JobPlan> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Every plan of the pass, live and obsolete.
    pub fn instance_plans(&self) -> impl Iterator<Item = &InstancePlan> {
        self.jobs
            .iter()
            .flat_map(|j| j.plans.iter().chain(&j.obsolete))
            .chain(&self.obsolete)
    }

    /// Every plan that deletes an instance.
    pub fn obsolete_plans(&self) -> impl Iterator<Item = &InstancePlan> {
        self.instance_plans().filter(|p| p.is_obsolete())
    }
}

/// Runs reconciliation passes with explicit configuration.
#[derive(Debug, Clone, Default)]
pub struct DeploymentPlanner {
    config: ConvoyConfig,
}

impl DeploymentPlanner {
    pub fn new(config: ConvoyConfig) -> Self {
        Self { config }
    }

    /// Fetch agent state of legacy instances, then plan.
    pub async fn reconcile<S, R>(
        &self,
        ctx: &DeploymentContext,
        source: Arc<S>,
        repo: &mut R,
        ipam: &mut IpProvider,
    ) -> PlannerResult<DeploymentPlan>
    where
        S: AgentStateSource,
        R: InstanceRepository,
    {
        let states =
            fetch_agent_states(source, &ctx.existing, self.config.planner.snapshot_workers).await?;
        self.plan(ctx, &states, repo, ipam)
    }

    /// Plan a deployment against already fetched agent states.
    pub fn plan<R: InstanceRepository>(
        &self,
        ctx: &DeploymentContext,
        agent_states: &HashMap<String, AgentState>,
        repo: &mut R,
        ipam: &mut IpProvider,
    ) -> PlannerResult<DeploymentPlan> {
        let update = ctx.update.unwrap_or(self.config.update);
        let migration = migrate_jobs(&ctx.jobs, &ctx.existing)?;

        let mut factory = InstancePlanFactory::new(repo, ipam, agent_states);
        factory.reserve_existing(&ctx.existing)?;

        let mut jobs = Vec::with_capacity(ctx.jobs.len());
        for job in &ctx.jobs {
            let candidates = migration.candidates_for(&job.name);
            let desired = job.desired_instances();
            let placed = if job.uses_static_ips() {
                place_by_static_ips(job, &ctx.networks, desired, candidates)?
            } else {
                place_by_zone(&job.azs, desired, candidates)
            };
            let placed = assign_indexes(&job.name, placed);

            let mut plans = Vec::with_capacity(placed.len());
            for entry in placed {
                plans.push(factory.plan(job, entry)?);
            }
            let plans = elect_bootstrap(&job.name, plans);

            let (obsolete, live): (Vec<InstancePlan>, Vec<InstancePlan>) =
                plans.into_iter().partition(InstancePlan::is_obsolete);
            let ordered: Vec<InstancePlan> = sort_for_rollout(&live).into_iter().cloned().collect();
            let uuids: Vec<String> = ordered.iter().map(|p| p.instance.uuid.clone()).collect();
            let batches = plan_batches(uuids, update);

            debug!(job = %job.name, live = ordered.len(), obsolete = obsolete.len(), batches = batches.len(), "planned job");
            jobs.push(JobPlan {
                name: job.name.clone(),
                plans: ordered,
                obsolete,
                batches,
            });
        }

        let obsolete: Vec<InstancePlan> = migration
            .obsolete
            .into_iter()
            .map(|existing| factory.plan_obsolete(existing))
            .collect();

        info!(
            deployment = %ctx.name,
            jobs = jobs.len(),
            obsolete = obsolete.len(),
            "planned deployment"
        );
        Ok(DeploymentPlan {
            name: ctx.name.clone(),
            jobs,
            obsolete,
        })
    }
}

/// Release the reservations every plan marks obsolete.
///
/// Called by apply once the instances are gone. Reservations that never
/// resolved hold nothing and are skipped, as are addresses no row records.
/// Returns how many were released.
pub fn release_obsolete_reservations(
    plan: &DeploymentPlan,
    ipam: &mut IpProvider,
) -> PlannerResult<usize> {
    let mut released = 0;
    for instance in plan.instance_plans() {
        for reservation in instance.obsolete_reservations().filter(|r| r.resolved) {
            match ipam.release(reservation) {
                Ok(()) => {
                    debug!(uuid = %instance.instance.uuid, reservation = %reservation, "released reservation");
                    released += 1;
                }
                Err(IpamError::NotOwned { .. }) => {
                    debug!(uuid = %instance.instance.uuid, reservation = %reservation, "reservation had no row");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    info!(deployment = %plan.name, released, "released obsolete reservations");
    Ok(released)
}
