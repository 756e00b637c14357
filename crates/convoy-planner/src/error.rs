//! Planner error types.

use thiserror::Error;

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Placement(#[from] convoy_placement::PlacementError),

    #[error(transparent)]
    Ipam(#[from] convoy_ipam::IpamError),

    #[error("state store error: {0}")]
    State(#[from] convoy_state::StateError),

    #[error("failed to fetch agent state of instance '{instance}': {reason}")]
    AgentSnapshot { instance: String, reason: String },

    #[error("agent state worker failed: {0}")]
    Join(String),
}

pub type PlannerResult<T> = Result<T, PlannerError>;
