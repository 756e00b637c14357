//! Per-subnet IP allocation.
//!
//! Dynamic allocation follows a gap-first policy: the lowest free address
//! of the range wins, so addresses released by deleted instances are
//! refilled before untouched space. Static-pool and blacklisted ranges are
//! kept as ranges and skipped whole. Given the same reservation rows the
//! result is always the same address, which keeps re-planning idempotent.

use std::collections::BTreeSet;
use std::net::IpAddr;

use tracing::{debug, info, warn};

use convoy_core::{AddressKind, IpAddressRecord};
use convoy_state::StateStore;

use crate::book::{MemoryBook, ReservationBook, StoreBook};
use crate::error::{IpamError, IpamResult};
use crate::range::{AddressRange, covered, from_bits, to_bits};

/// Authority over the addresses of one CIDR range on one network.
pub trait IpAllocator: Send {
    fn network(&self) -> &str;

    fn range(&self) -> &AddressRange;

    /// Allocate the lowest free non-static address for `owner`.
    ///
    /// Fails with `NoCapacity` when the range is exhausted and `Conflict`
    /// when a concurrent writer took the chosen address first. Conflicts are
    /// never retried here.
    fn allocate_dynamic(&mut self, owner: &str) -> IpamResult<IpAddr>;

    /// Reserve a specific address for `owner`.
    ///
    /// Static-pool addresses are reserved as `Static`, everything else in
    /// range as `Dynamic`. `requested` rejects the other kind. Reserving an
    /// address the same owner already holds succeeds with the recorded kind.
    fn reserve(
        &mut self,
        ip: IpAddr,
        owner: &str,
        requested: Option<AddressKind>,
    ) -> IpamResult<AddressKind>;

    /// Hand a reserved address back.
    fn release(&mut self, ip: IpAddr) -> IpamResult<()>;

    /// Exclude every address of `entry` from allocation for good.
    ///
    /// Addresses an instance already holds stay with it until released.
    fn blacklist_range(&mut self, entry: AddressRange) -> IpamResult<()>;

    fn blacklist(&mut self, ip: IpAddr) -> IpamResult<()> {
        self.blacklist_range(AddressRange::single(ip))
    }
}

/// Lowest address of `range` that is neither in `taken` nor inside one of
/// the `skipped` ranges.
pub(crate) fn first_gap(
    range: &AddressRange,
    taken: &BTreeSet<u128>,
    skipped: &[AddressRange],
) -> Option<u128> {
    let last = range.last_bits();
    let mut candidate = range.first_bits();
    loop {
        if let Some(run) = skipped.iter().find(|r| r.contains_bits(candidate)) {
            if run.last_bits() >= last {
                return None;
            }
            candidate = run.last_bits() + 1;
        } else if taken.contains(&candidate) {
            if candidate == last {
                return None;
            }
            candidate += 1;
        } else {
            return Some(candidate);
        }
    }
}

/// Allocation policy over a reservation book.
pub struct RangeAllocator<B> {
    network: String,
    range: AddressRange,
    static_pool: Vec<AddressRange>,
    blacklisted: Vec<AddressRange>,
    book: B,
}

/// Allocator whose rows live only in this process.
pub type InMemoryAllocator = RangeAllocator<MemoryBook>;

/// Allocator whose rows live in the shared state store.
pub type StoreAllocator = RangeAllocator<StoreBook>;

impl InMemoryAllocator {
    pub fn in_memory(
        network: &str,
        range: AddressRange,
        static_pool: &[AddressRange],
    ) -> IpamResult<Self> {
        Self::new(network, range, static_pool, MemoryBook::new())
    }
}

impl StoreAllocator {
    pub fn with_store(
        network: &str,
        range: AddressRange,
        static_pool: &[AddressRange],
        store: StateStore,
    ) -> IpamResult<Self> {
        Self::new(network, range, static_pool, StoreBook::new(store))
    }
}

impl<B: ReservationBook> RangeAllocator<B> {
    /// Every static-pool entry must lie inside `range`.
    pub fn new(
        network: &str,
        range: AddressRange,
        static_pool: &[AddressRange],
        book: B,
    ) -> IpamResult<Self> {
        if let Some(entry) = static_pool.iter().find(|e| !range.covers(e)) {
            return Err(IpamError::OutOfRange {
                network: network.to_string(),
                ip: outside_address(&range, entry),
            });
        }
        Ok(Self {
            network: network.to_string(),
            range,
            static_pool: static_pool.to_vec(),
            blacklisted: Vec::new(),
            book,
        })
    }

    /// How many static-pool addresses nobody holds yet.
    pub fn available_static(&self) -> IpamResult<u128> {
        let held = self
            .held_bits()?
            .into_iter()
            .filter(|&bits| self.in_static_pool(bits))
            .count() as u128;
        Ok(covered(&self.static_pool).saturating_sub(held))
    }

    /// How many addresses dynamic allocation can still hand out.
    pub fn available_dynamic(&self) -> IpamResult<u128> {
        let skipped = self.skipped();
        let held = self
            .held_bits()?
            .into_iter()
            .filter(|&bits| !skipped.iter().any(|r| r.contains_bits(bits)))
            .count() as u128;
        Ok(self
            .range
            .len()
            .saturating_sub(covered(&skipped))
            .saturating_sub(held))
    }

    /// Reserved rows inside this range.
    fn held_bits(&self) -> IpamResult<BTreeSet<u128>> {
        Ok(self
            .book
            .addresses(&self.network)?
            .into_iter()
            .filter(|ip| self.range.contains(*ip))
            .map(to_bits)
            .collect())
    }

    /// Ranges dynamic allocation never hands out.
    fn skipped(&self) -> Vec<AddressRange> {
        self.static_pool
            .iter()
            .chain(&self.blacklisted)
            .copied()
            .collect()
    }

    fn in_static_pool(&self, bits: u128) -> bool {
        self.static_pool.iter().any(|r| r.contains_bits(bits))
    }

    fn is_blacklisted(&self, bits: u128) -> bool {
        self.blacklisted.iter().any(|r| r.contains_bits(bits))
    }

    fn out_of_range(&self, ip: IpAddr) -> IpamError {
        IpamError::OutOfRange {
            network: self.network.clone(),
            ip,
        }
    }

    fn wrong_type(&self, ip: IpAddr, expected: AddressKind, actual: AddressKind) -> IpamError {
        IpamError::WrongType {
            network: self.network.clone(),
            ip,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// An address of `entry` that `range` does not contain.
fn outside_address(range: &AddressRange, entry: &AddressRange) -> IpAddr {
    if range.contains(entry.first()) {
        entry.last()
    } else {
        entry.first()
    }
}

impl<B: ReservationBook> IpAllocator for RangeAllocator<B> {
    fn network(&self) -> &str {
        &self.network
    }

    fn range(&self) -> &AddressRange {
        &self.range
    }

    fn allocate_dynamic(&mut self, owner: &str) -> IpamResult<IpAddr> {
        let held = self.held_bits()?;
        let Some(bits) = first_gap(&self.range, &held, &self.skipped()) else {
            return Err(IpamError::NoCapacity {
                network: self.network.clone(),
            });
        };
        let ip = from_bits(bits, self.range.is_ipv6());
        let record = IpAddressRecord::new(&self.network, ip, AddressKind::Dynamic, Some(owner));
        if !self.book.insert_if_absent(record)? {
            debug!(network = %self.network, %ip, owner, "dynamic ip taken concurrently");
            return Err(IpamError::Conflict {
                network: self.network.clone(),
                ip,
            });
        }
        debug!(network = %self.network, %ip, owner, "allocated dynamic ip");
        Ok(ip)
    }

    fn reserve(
        &mut self,
        ip: IpAddr,
        owner: &str,
        requested: Option<AddressKind>,
    ) -> IpamResult<AddressKind> {
        if !self.range.contains(ip) {
            return Err(self.out_of_range(ip));
        }

        if let Some(row) = self.book.get(&self.network, ip)? {
            let holder = row.owner.unwrap_or_default();
            if holder != owner {
                return Err(IpamError::AlreadyOwned {
                    network: self.network.clone(),
                    ip,
                    owner: holder,
                });
            }
            return match requested {
                Some(want) if want != row.kind => Err(self.wrong_type(ip, want, row.kind)),
                _ => Ok(row.kind),
            };
        }

        let bits = to_bits(ip);
        if self.is_blacklisted(bits) {
            return Err(IpamError::IpReserved {
                network: self.network.clone(),
                ip,
            });
        }
        let kind = if self.in_static_pool(bits) {
            AddressKind::Static
        } else {
            AddressKind::Dynamic
        };
        if let Some(want) = requested {
            if want != kind {
                return Err(self.wrong_type(ip, want, kind));
            }
        }

        let record = IpAddressRecord::new(&self.network, ip, kind, Some(owner));
        if !self.book.insert_if_absent(record)? {
            return Err(IpamError::Conflict {
                network: self.network.clone(),
                ip,
            });
        }
        info!(network = %self.network, %ip, owner, %kind, "reserved ip");
        Ok(kind)
    }

    fn release(&mut self, ip: IpAddr) -> IpamResult<()> {
        if !self.book.remove(&self.network, ip)? {
            return Err(IpamError::NotOwned {
                network: self.network.clone(),
                ip,
            });
        }
        info!(network = %self.network, %ip, "released ip");
        Ok(())
    }

    fn blacklist_range(&mut self, entry: AddressRange) -> IpamResult<()> {
        if !self.range.covers(&entry) {
            return Err(IpamError::ReservedIpOutOfRange {
                network: self.network.clone(),
                ip: outside_address(&self.range, &entry),
            });
        }
        for ip in self.book.addresses(&self.network)? {
            if !entry.contains(ip) {
                continue;
            }
            let owner = self.book.get(&self.network, ip)?.and_then(|row| row.owner);
            warn!(network = %self.network, %ip, ?owner, "reserved range covers a held ip, keeping its owner");
        }
        self.blacklisted.push(entry);
        debug!(network = %self.network, %entry, "blacklisted range");
        Ok(())
    }
}
