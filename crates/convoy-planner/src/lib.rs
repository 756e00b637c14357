//! convoy-planner — reconciles a deployment's desired state with what runs.
//!
//! A pass migrates renamed jobs, places every desired slot, assigns
//! indices, builds one `InstancePlan` per instance with its network
//! reservations, elects a bootstrap instance per job and orders the plans
//! for rollout. `commit_plan` then persists a plan's instances and
//! reservations to the state store.
//!
//! # Components
//!
//! - **`planner`** — `DeploymentPlanner` entry point and `DeploymentPlan` output
//! - **`apply`** — Commits a plan to the state store
//! - **`factory`** — Builds instance plans and reconciles network reservations
//! - **`bootstrap`** — Bootstrap instance election
//! - **`snapshot`** — Agent state fetch over a bounded worker pool
//! - **`repository`** — Instance repository trait and in-memory implementation
//! - **`plan`** — `InstancePlan`, `NetworkPlan`, `InstanceHandle`

pub mod apply;
pub mod bootstrap;
pub mod error;
pub mod factory;
pub mod plan;
pub mod planner;
pub mod repository;
pub mod snapshot;

pub use apply::{CommitSummary, commit_plan};
pub use bootstrap::elect_bootstrap;
pub use error::{PlannerError, PlannerResult};
pub use factory::InstancePlanFactory;
pub use plan::{InstanceHandle, InstancePlan, NetworkPlan};
pub use planner::{
    DeploymentContext, DeploymentPlan, DeploymentPlanner, JobPlan, release_obsolete_reservations,
};
pub use repository::{InMemoryRepository, InstanceRepository, sequential_uuids};
pub use snapshot::{AgentState, AgentStateSource, fetch_agent_states};
