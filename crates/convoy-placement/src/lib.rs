//! Convoy placement — decides where each desired instance of a job lands.
//!
//! Placement is a pure function of the desired job and the existing
//! instances that may be reused for it. It partitions instances into
//! needed-new, needed-existing, and obsolete, each stage returning new
//! annotated values rather than mutating its input.
//!
//! # Components
//!
//! - **`migrator`** — Folds instances of renamed jobs into their new job
//! - **`zone`** — AZ round-robin placement preferring AZs with existing instances
//! - **`static_ips`** — Placement derived from the subnets owning pinned static IPs
//! - **`index`** — Stable index reuse and lowest-free index assignment
//! - **`placed`** — The `Placed` tagged variant passed between stages

pub mod error;
pub mod index;
pub mod migrator;
pub mod placed;
pub mod static_ips;
pub mod zone;

pub use error::{PlacementError, PlacementResult};
pub use index::{IndexAssigner, assign_indexes};
pub use migrator::{MigrationPlan, migrate_jobs};
pub use placed::Placed;
pub use static_ips::place_by_static_ips;
pub use zone::place_by_zone;
