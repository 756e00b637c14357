use std::path::Path;

use anyhow::bail;
use tracing::info;

use convoy_core::ConvoyConfig;
use convoy_planner::{CommitSummary, commit_plan};

use super::OutputFormat;
use super::plan::{build_plan, open_store};

/// Plan the manifest, then commit the plan to the configured state store.
pub async fn apply(manifest_path: &Path, config: ConvoyConfig, format: OutputFormat) -> anyhow::Result<()> {
    let summary = run(manifest_path, config).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => println!(
            "recorded {} instances, deleted {}, released {} addresses",
            summary.recorded, summary.deleted, summary.released
        ),
    }
    Ok(())
}

async fn run(manifest_path: &Path, config: ConvoyConfig) -> anyhow::Result<CommitSummary> {
    let Some(path) = config.state.path.clone() else {
        bail!("apply needs a state store; set state.path in the configuration");
    };
    let attempts = config.planner.max_ip_allocation_attempts;
    let (manifest, plan) = build_plan(manifest_path, config).await?;

    let store = open_store(&path)?;
    let summary = commit_plan(&plan, &manifest.networks, &store, attempts)?;
    info!(deployment = %plan.name, recorded = summary.recorded, "apply complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_state::StateStore;

    const MANIFEST: &str = r#"
name = "demo"

[[availability_zones]]
name = "z1"

[[networks]]
name = "private"

[[networks.subnets]]
range = "10.0.1.0/24"
gateway = "10.0.1.1"
azs = ["z1"]

[[jobs]]
name = "web"
instances = 2
azs = ["z1"]

[[jobs.networks]]
name = "private"
"#;

    #[tokio::test]
    async fn applying_twice_keeps_instances_and_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("deployment.toml");
        std::fs::write(&manifest_path, MANIFEST).unwrap();
        let state = dir.path().join("state.redb");
        let mut config = ConvoyConfig::default();
        config.state.path = Some(state.clone());

        let first = run(&manifest_path, config.clone()).await.unwrap();
        assert_eq!(first.recorded, 2);
        let uuids = |store: &StateStore| -> Vec<String> {
            let mut uuids: Vec<String> = store.list_instances().unwrap().into_iter().map(|i| i.uuid).collect();
            uuids.sort();
            uuids
        };
        let before = uuids(&StateStore::open(&state).unwrap());

        let second = run(&manifest_path, config).await.unwrap();
        assert_eq!(second.deleted + second.released, 0);

        let store = StateStore::open(&state).unwrap();
        assert_eq!(uuids(&store), before);
        let rows = store.list_ips_for_network("private").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.owner.as_ref().is_some_and(|o| before.contains(o))));
    }

    #[tokio::test]
    async fn apply_without_state_store_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("deployment.toml");
        std::fs::write(&manifest_path, MANIFEST).unwrap();

        let err = run(&manifest_path, ConvoyConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("state.path"));
    }
}
