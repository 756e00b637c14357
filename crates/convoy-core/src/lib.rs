//! convoy-core — shared domain types for the Convoy deployment planner.
//!
//! Holds the already-validated desired state (availability zones, networks,
//! jobs), the persisted view of what exists, process configuration, and the
//! TOML deployment manifest the CLI feeds into a reconciliation pass.

pub mod config;
pub mod manifest;
pub mod types;

pub use config::{ConvoyConfig, LogConfig, PlannerConfig, StateConfig, UpdateConfig};
pub use manifest::{AgentStates, DeploymentManifest};
pub use types::*;
