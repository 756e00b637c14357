use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use convoy_core::{AgentStates, ConvoyConfig, DeploymentManifest, ExistingInstance};
use convoy_ipam::IpProvider;
use convoy_planner::{
    AgentState, AgentStateSource, DeploymentContext, DeploymentPlan, DeploymentPlanner,
    InMemoryRepository, InstancePlan,
};
use convoy_state::StateStore;

use super::OutputFormat;

/// Agent states recorded in the manifest. Instances without an entry
/// report nothing.
struct ManifestAgents {
    states: AgentStates,
}

impl AgentStateSource for ManifestAgents {
    async fn get_state(&self, instance: &ExistingInstance) -> anyhow::Result<AgentState> {
        Ok(self.states.get(&instance.uuid).cloned().unwrap_or_default())
    }
}

/// Plan one pass of the manifest and print it. Never writes state.
pub async fn plan(manifest_path: &Path, config: ConvoyConfig, format: OutputFormat) -> anyhow::Result<()> {
    let (_, plan) = build_plan(manifest_path, config).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => print!("{}", format_plan(&plan)?),
    }
    Ok(())
}

/// Plan against an in-memory copy of the state store, when one is
/// configured, so planning leaves stored reservations untouched.
pub(crate) async fn build_plan(
    manifest_path: &Path,
    config: ConvoyConfig,
) -> anyhow::Result<(DeploymentManifest, DeploymentPlan)> {
    let manifest = DeploymentManifest::from_file(manifest_path)?;
    let mut ctx = DeploymentContext::from_manifest(&manifest);
    let attempts = config.planner.max_ip_allocation_attempts;

    let mut ipam = match &config.state.path {
        Some(path) => {
            let store = open_store(path)?;
            ctx.existing = merge_existing(ctx.existing, store.list_instances()?);
            IpProvider::from_snapshot(&manifest.networks, &store, attempts)?
        }
        None => IpProvider::in_memory(&manifest.networks, attempts)?,
    };

    let agents = Arc::new(ManifestAgents {
        states: manifest.agent_states.clone(),
    });
    let mut repo = InMemoryRepository::new();
    let plan = DeploymentPlanner::new(config)
        .reconcile(&ctx, agents, &mut repo, &mut ipam)
        .await?;
    info!(deployment = %plan.name, "plan complete");
    Ok((manifest, plan))
}

pub(crate) fn open_store(path: &Path) -> anyhow::Result<StateStore> {
    StateStore::open(path).with_context(|| format!("opening state store {}", path.display()))
}

/// Stored instances, with manifest entries taking precedence.
fn merge_existing(
    from_manifest: Vec<ExistingInstance>,
    stored: Vec<ExistingInstance>,
) -> Vec<ExistingInstance> {
    let mut merged: BTreeMap<String, ExistingInstance> =
        stored.into_iter().map(|i| (i.table_key(), i)).collect();
    for instance in from_manifest {
        merged.insert(instance.table_key(), instance);
    }
    merged.into_values().collect()
}

fn format_plan(plan: &DeploymentPlan) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "deployment {}", plan.name)?;
    for job in &plan.jobs {
        writeln!(
            out,
            "\njob {} ({} instances, {} to delete)",
            job.name,
            job.plans.len(),
            job.obsolete.len()
        )?;
        for instance in job.plans.iter().chain(&job.obsolete) {
            writeln!(out, "  {}", format_instance(instance)?)?;
        }
        for (n, batch) in job.batches.iter().enumerate() {
            writeln!(out, "  batch {n} {}: {}", batch.kind, batch.items.join(", "))?;
        }
    }
    if !plan.obsolete.is_empty() {
        writeln!(out, "\nobsolete instance groups")?;
        for instance in &plan.obsolete {
            writeln!(out, "  {}", format_instance(instance)?)?;
        }
    }
    Ok(out)
}

fn format_instance(plan: &InstancePlan) -> anyhow::Result<String> {
    let action = if plan.is_obsolete() {
        "delete"
    } else if plan.is_new() {
        "create"
    } else {
        "keep"
    };
    let mut line = format!(
        "{action:<6} {}/{} index={} az={}",
        plan.instance.job,
        plan.instance.uuid,
        plan.instance.index,
        plan.instance.az.as_deref().unwrap_or("-"),
    );
    if plan.is_bootstrap() {
        line.push_str(" bootstrap");
    }
    for network in &plan.network_plans {
        let r = &network.reservation;
        let ip = r.ip.map_or_else(|| "-".to_string(), |ip| ip.to_string());
        let mark = if network.obsolete { " (release)" } else { "" };
        write!(line, " {}={}{}", r.network, ip, mark)?;
    }
    Ok(line)
}
