//! Where reservation rows live.
//!
//! A book stores [`IpAddressRecord`]s for one network. `RangeAllocator`
//! implements all allocation policy on top, so both books behave
//! identically apart from durability and cross-process visibility.

use std::collections::BTreeMap;
use std::net::IpAddr;

use convoy_core::IpAddressRecord;
use convoy_state::StateStore;

use crate::error::IpamResult;

/// Storage of reservation rows for one network.
pub trait ReservationBook: Send {
    fn get(&self, network: &str, ip: IpAddr) -> IpamResult<Option<IpAddressRecord>>;

    /// Every reserved address on the network, any order.
    fn addresses(&self, network: &str) -> IpamResult<Vec<IpAddr>>;

    /// Create the row unless one exists. `false` means someone else won.
    fn insert_if_absent(&mut self, record: IpAddressRecord) -> IpamResult<bool>;

    fn remove(&mut self, network: &str, ip: IpAddr) -> IpamResult<bool>;
}

// ── Memory ─────────────────────────────────────────────────────────

/// Rows held in a sorted map, private to one allocator.
#[derive(Debug, Default, Clone)]
pub struct MemoryBook {
    rows: BTreeMap<IpAddr, IpAddressRecord>,
}

impl MemoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A book preloaded with rows, e.g. read from the state store.
    pub fn from_records(records: impl IntoIterator<Item = IpAddressRecord>) -> Self {
        Self {
            rows: records.into_iter().map(|r| (r.address, r)).collect(),
        }
    }
}

impl ReservationBook for MemoryBook {
    fn get(&self, _network: &str, ip: IpAddr) -> IpamResult<Option<IpAddressRecord>> {
        Ok(self.rows.get(&ip).cloned())
    }

    fn addresses(&self, _network: &str) -> IpamResult<Vec<IpAddr>> {
        Ok(self.rows.keys().copied().collect())
    }

    fn insert_if_absent(&mut self, record: IpAddressRecord) -> IpamResult<bool> {
        if self.rows.contains_key(&record.address) {
            return Ok(false);
        }
        self.rows.insert(record.address, record);
        Ok(true)
    }

    fn remove(&mut self, _network: &str, ip: IpAddr) -> IpamResult<bool> {
        Ok(self.rows.remove(&ip).is_some())
    }
}

// ── State store ────────────────────────────────────────────────────

/// Rows persisted in the shared redb store.
#[derive(Clone)]
pub struct StoreBook {
    store: StateStore,
}

impl StoreBook {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

impl ReservationBook for StoreBook {
    fn get(&self, network: &str, ip: IpAddr) -> IpamResult<Option<IpAddressRecord>> {
        Ok(self.store.get_ip(network, ip)?)
    }

    fn addresses(&self, network: &str) -> IpamResult<Vec<IpAddr>> {
        Ok(self
            .store
            .list_ips_for_network(network)?
            .into_iter()
            .map(|r| r.address)
            .collect())
    }

    fn insert_if_absent(&mut self, record: IpAddressRecord) -> IpamResult<bool> {
        Ok(self.store.insert_ip_if_absent(&record)?)
    }

    fn remove(&mut self, network: &str, ip: IpAddr) -> IpamResult<bool> {
        Ok(self.store.delete_ip(network, ip)?)
    }
}
