//! convoy-ipam — IP address management for deployment networks.
//!
//! Each manual subnet is served by one allocator that hands out, reserves,
//! and releases individual addresses of its CIDR range. Allocators share
//! one behaviour and differ only in where reservation rows live: an
//! in-memory book for dry runs and tests, or the redb state store where
//! concurrent deployments race on an atomic insert.
//!
//! # Components
//!
//! - **`range`** — Address ranges over IPv4/IPv6 and `first - last` entry parsing
//! - **`allocator`** — `IpAllocator` trait, gap-first allocation, `RangeAllocator`
//! - **`book`** — Reservation row backends (memory, state store)
//! - **`reservation`** — `NetworkReservation` records bound to instances
//! - **`provider`** — Per-deployment network → subnet routing with bounded retry

pub mod allocator;
pub mod book;
pub mod error;
pub mod provider;
pub mod range;
pub mod reservation;

#[cfg(test)]
mod backend_tests;

pub use allocator::{InMemoryAllocator, IpAllocator, RangeAllocator, StoreAllocator};
pub use book::{MemoryBook, ReservationBook, StoreBook};
pub use error::{IpamError, IpamResult};
pub use provider::IpProvider;
pub use range::AddressRange;
pub use reservation::{NetworkReservation, ReservationType};
