//! Deployment manifest: the desired state of one deployment plus the
//! existing instances it is reconciled against.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::config::UpdateConfig;
use crate::types::{AvailabilityZone, DesiredJob, ExistingInstance, Network, NetworkKind};

/// Agent-reported state, keyed by instance uuid.
pub type AgentStates = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub name: String,
    #[serde(default)]
    pub availability_zones: Vec<AvailabilityZone>,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub jobs: Vec<DesiredJob>,
    #[serde(default)]
    pub update: Option<UpdateConfig>,
    #[serde(default)]
    pub existing: Vec<ExistingInstance>,
    #[serde(default)]
    pub agent_states: AgentStates,
}

impl DeploymentManifest {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let manifest: DeploymentManifest = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject references the planner cannot resolve.
    pub fn validate(&self) -> anyhow::Result<()> {
        let azs: BTreeSet<&str> = self
            .availability_zones
            .iter()
            .map(|az| az.name.as_str())
            .collect();
        let networks: BTreeMap<&str, &Network> =
            self.networks.iter().map(|n| (n.name.as_str(), n)).collect();

        let mut seen = BTreeSet::new();
        for job in &self.jobs {
            if !seen.insert(job.name.as_str()) {
                bail!("deployment '{}' declares job '{}' twice", self.name, job.name);
            }
            for az in &job.azs {
                if !azs.contains(az.as_str()) {
                    bail!("job '{}' references unknown availability zone '{az}'", job.name);
                }
            }
            for net in &job.networks {
                let Some(network) = networks.get(net.name.as_str()) else {
                    bail!("job '{}' references unknown network '{}'", job.name, net.name);
                };
                if !net.static_ips.is_empty() && network.kind == NetworkKind::Dynamic {
                    bail!(
                        "job '{}' declares static IPs on dynamic network '{}'",
                        job.name,
                        net.name
                    );
                }
            }
        }

        for network in &self.networks {
            for az in &network.azs {
                if !azs.contains(az.as_str()) {
                    bail!(
                        "network '{}' references unknown availability zone '{az}'",
                        network.name
                    );
                }
            }
            for subnet in &network.subnets {
                for az in &subnet.azs {
                    if !azs.contains(az.as_str()) {
                        bail!(
                            "network '{}' subnet {} references unknown availability zone '{az}'",
                            network.name,
                            subnet.range
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
