//! convoy.toml process configuration.
//!
//! Passed explicitly into the reconciliation entry point; there is no global
//! config. Every section is optional and an empty file is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvoyConfig {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Worker pool size for fetching agent state before planning.
    #[serde(default = "default_snapshot_workers")]
    pub snapshot_workers: usize,
    /// Upper bound on dynamic allocation attempts after insert conflicts.
    #[serde(default = "default_max_ip_allocation_attempts")]
    pub max_ip_allocation_attempts: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            snapshot_workers: default_snapshot_workers(),
            max_ip_allocation_attempts: default_max_ip_allocation_attempts(),
        }
    }
}

fn default_snapshot_workers() -> usize {
    32
}

fn default_max_ip_allocation_attempts() -> u32 {
    16
}

/// Rolling update settings: a canary batch, then batches of `max_in_flight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default = "default_canaries")]
    pub canaries: u32,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            canaries: default_canaries(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_canaries() -> u32 {
    1
}

fn default_max_in_flight() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    /// redb file holding IP reservations. In-memory when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "convoy=info".to_string()
}

impl ConvoyConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConvoyConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ConvoyConfig = toml::from_str("").unwrap();
        assert_eq!(config, ConvoyConfig::default());
        assert_eq!(config.planner.snapshot_workers, 32);
        assert_eq!(config.planner.max_ip_allocation_attempts, 16);
        assert_eq!(config.update.canaries, 1);
        assert_eq!(config.log.filter, "convoy=info");
        assert!(config.state.path.is_none());
    }

    #[test]
    fn test_parse_partial_sections() {
        let toml_str = r#"
[planner]
snapshot_workers = 4

[update]
max_in_flight = 3

[state]
path = "/var/lib/convoy/state.redb"
"#;
        let config: ConvoyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.planner.snapshot_workers, 4);
        assert_eq!(config.planner.max_ip_allocation_attempts, 16);
        assert_eq!(config.update.canaries, 1);
        assert_eq!(config.update.max_in_flight, 3);
        assert_eq!(
            config.state.path.as_deref(),
            Some(Path::new("/var/lib/convoy/state.redb"))
        );
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = ConvoyConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("snapshot_workers"));
        let parsed: ConvoyConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
