//! redb table definitions for the Convoy state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// IP reservation rows keyed by `{network}:{address}`.
pub const IP_ADDRESSES: TableDefinition<&str, &[u8]> = TableDefinition::new("ip_addresses");

/// Instance records keyed by `{job}:{uuid}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
