//! convoy-state — embedded state store for Convoy.
//!
//! Backed by [redb](https://docs.rs/redb), holds the persisted IP
//! reservation rows and instance records a reconciliation pass reads.
//!
//! # Architecture
//!
//! Domain types from `convoy-core` are JSON-serialized into redb's `&[u8]`
//! value columns under composite keys (`{network}:{address}`,
//! `{job}:{uuid}`). Reservation rows are created with an atomic
//! insert-if-absent so two writers can never both own one address.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
