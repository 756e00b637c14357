//! Convoy rollout ordering — the order downstream updaters apply plans in.
//!
//! Ordering is pure: the same set of plans always yields the same order,
//! and obsolete plans never appear in it (they go through deletion).
//!
//! # Components
//!
//! - **`sorter`** — Bootstrap first, then its AZ, then unzoned, then other AZs
//! - **`batch`** — Splits an ordered list into a canary batch and in-flight batches

pub mod batch;
pub mod sorter;

pub use batch::{BatchKind, UpdateBatch, plan_batches};
pub use sorter::{RolloutUnit, rollout_key, sort_for_rollout};
