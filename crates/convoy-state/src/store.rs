//! StateStore — redb-backed state persistence for Convoy.
//!
//! Provides typed operations over IP reservation rows and instance records.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use convoy_core::{ExistingInstance, IpAddressRecord, ip_table_key};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(IP_ADDRESSES).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── IP addresses ───────────────────────────────────────────────

    /// Create a reservation row only if no row exists for its key.
    ///
    /// Returns `false` when another writer already holds the address. The
    /// existence check and the insert share one write transaction.
    pub fn insert_ip_if_absent(&self, record: &IpAddressRecord) -> StateResult<bool> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(IP_ADDRESSES).map_err(map_err!(Table))?;
            let taken = table.get(key.as_str()).map_err(map_err!(Read))?.is_some();
            if !taken {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
            inserted = !taken;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, inserted, "ip reservation insert");
        Ok(inserted)
    }

    /// Get the reservation row for an address on a network.
    pub fn get_ip(&self, network: &str, address: IpAddr) -> StateResult<Option<IpAddressRecord>> {
        let key = ip_table_key(network, address);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(IP_ADDRESSES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: IpAddressRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all reservation rows of a network, in key order.
    pub fn list_ips_for_network(&self, network: &str) -> StateResult<Vec<IpAddressRecord>> {
        let prefix = format!("{network}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(IP_ADDRESSES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: IpAddressRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Delete a reservation row. Returns true if it existed.
    pub fn delete_ip(&self, network: &str, address: IpAddr) -> StateResult<bool> {
        let key = ip_table_key(network, address);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(IP_ADDRESSES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "ip reservation deleted");
        Ok(existed)
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update an instance record.
    pub fn put_instance(&self, instance: &ExistingInstance) -> StateResult<()> {
        let key = instance.table_key();
        let value = serde_json::to_vec(instance).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// List every instance record of the deployment.
    pub fn list_instances(&self) -> StateResult<Vec<ExistingInstance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let instance: ExistingInstance =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(instance);
        }
        Ok(results)
    }

    /// Delete an instance record. Returns true if it existed.
    pub fn delete_instance(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "instance deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::AddressKind;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn row(network: &str, address: &str, owner: &str) -> IpAddressRecord {
        IpAddressRecord::new(network, ip(address), AddressKind::Dynamic, Some(owner))
    }

    // ── IP rows ────────────────────────────────────────────────────

    #[test]
    fn ip_insert_if_absent_rejects_second_writer() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.insert_ip_if_absent(&row("private", "10.0.0.5", "a")).unwrap());
        assert!(!store.insert_ip_if_absent(&row("private", "10.0.0.5", "b")).unwrap());

        let held = store.get_ip("private", ip("10.0.0.5")).unwrap().unwrap();
        assert_eq!(held.owner.as_deref(), Some("a"));
    }

    #[test]
    fn ip_same_address_on_other_network_is_independent() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.insert_ip_if_absent(&row("private", "10.0.0.5", "a")).unwrap());
        assert!(store.insert_ip_if_absent(&row("public", "10.0.0.5", "b")).unwrap());
    }

    #[test]
    fn ip_list_for_network() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.insert_ip_if_absent(&row("private", "10.0.0.5", "a")).unwrap());
        assert!(store.insert_ip_if_absent(&row("private", "10.0.0.6", "b")).unwrap());
        assert!(store.insert_ip_if_absent(&row("public", "192.168.1.1", "c")).unwrap());

        assert_eq!(store.list_ips_for_network("private").unwrap().len(), 2);
        assert_eq!(store.list_ips_for_network("public").unwrap().len(), 1);
        assert!(store.list_ips_for_network("other").unwrap().is_empty());
    }

    #[test]
    fn ip_delete() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.insert_ip_if_absent(&row("private", "10.0.0.5", "a")).unwrap());

        assert!(store.delete_ip("private", ip("10.0.0.5")).unwrap());
        assert!(!store.delete_ip("private", ip("10.0.0.5")).unwrap());
        assert!(store.get_ip("private", ip("10.0.0.5")).unwrap().is_none());
    }

    #[test]
    fn ip_ipv6_rows() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.insert_ip_if_absent(&row("v6", "fd00::1", "a")).unwrap());
        let rows = store.list_ips_for_network("v6").unwrap();
        assert_eq!(rows[0].address, ip("fd00::1"));
    }

    // ── Instances ──────────────────────────────────────────────────

    #[test]
    fn instance_put_overwrites_and_lists() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&ExistingInstance::new("web", 0, "w0", Some("z1"))).unwrap();
        store.put_instance(&ExistingInstance::new("web", 1, "w1", None)).unwrap();
        store.put_instance(&ExistingInstance::new("db", 0, "d0", None)).unwrap();

        let moved = ExistingInstance::new("web", 0, "w0", Some("z2"));
        store.put_instance(&moved).unwrap();

        let all = store.list_instances().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&moved));
    }

    #[test]
    fn instance_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&ExistingInstance::new("web", 0, "w0", None)).unwrap();

        assert!(store.delete_instance("web:w0").unwrap());
        assert!(!store.delete_instance("web:w0").unwrap());
        assert!(store.list_instances().unwrap().is_empty());
    }

    // ── Persistence ────────────────────────────────────────────────

    #[test]
    fn reopened_store_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        {
            let store = StateStore::open(&path).unwrap();
            assert!(store.insert_ip_if_absent(&row("private", "10.0.0.5", "a")).unwrap());
            store
                .put_instance(&ExistingInstance::new("web", 0, "a", Some("z1")))
                .unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert!(store.get_ip("private", ip("10.0.0.5")).unwrap().is_some());
        assert_eq!(store.list_instances().unwrap().len(), 1);
    }

    #[test]
    fn clones_share_the_database() {
        let store = StateStore::open_in_memory().unwrap();
        let other = store.clone();
        assert!(store.insert_ip_if_absent(&row("private", "10.0.0.5", "a")).unwrap());
        assert!(!other.insert_ip_if_absent(&row("private", "10.0.0.5", "b")).unwrap());
    }
}
