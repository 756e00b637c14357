//! Network reservations: an instance's claim on an address of a network.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use convoy_core::{AddressKind, IpAddressRecord, NetworkKind};

/// How a reservation holds its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationType {
    Static,
    Dynamic,
    /// Loaded from persisted rows or agent state, kind not yet confirmed.
    Existing(NetworkKind),
}

impl fmt::Display for ReservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationType::Static => f.write_str("static"),
            ReservationType::Dynamic => f.write_str("dynamic"),
            ReservationType::Existing(kind) => write!(f, "existing {kind}"),
        }
    }
}

impl From<AddressKind> for ReservationType {
    fn from(kind: AddressKind) -> Self {
        match kind {
            AddressKind::Static => ReservationType::Static,
            AddressKind::Dynamic => ReservationType::Dynamic,
        }
    }
}

/// A claim of one instance on one network.
///
/// Created unresolved (maybe with a requested address), then resolved by
/// the `IpProvider` which fixes the type and assigns the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkReservation {
    pub instance: String,
    pub network: String,
    pub ip: Option<IpAddr>,
    pub kind: ReservationType,
    pub resolved: bool,
}

impl NetworkReservation {
    /// Any free address of the network.
    pub fn new_dynamic(instance: &str, network: &str) -> Self {
        Self {
            instance: instance.to_string(),
            network: network.to_string(),
            ip: None,
            kind: ReservationType::Dynamic,
            resolved: false,
        }
    }

    /// A specific address from the static pool.
    pub fn new_static(instance: &str, network: &str, ip: IpAddr) -> Self {
        Self {
            instance: instance.to_string(),
            network: network.to_string(),
            ip: Some(ip),
            kind: ReservationType::Static,
            resolved: false,
        }
    }

    /// An address an existing instance already holds.
    pub fn existing(instance: &str, network: &str, ip: Option<IpAddr>, kind: NetworkKind) -> Self {
        Self {
            instance: instance.to_string(),
            network: network.to_string(),
            ip,
            kind: ReservationType::Existing(kind),
            resolved: false,
        }
    }

    /// Rebuild from a persisted row of `instance`.
    pub fn from_record(instance: &str, record: &IpAddressRecord) -> Self {
        Self::existing(instance, &record.network, Some(record.address), NetworkKind::Manual)
    }

    pub(crate) fn resolve(self, ip: Option<IpAddr>, kind: ReservationType) -> Self {
        Self {
            ip,
            kind,
            resolved: true,
            ..self
        }
    }

    pub fn is_static(&self) -> bool {
        self.kind == ReservationType::Static
    }
}

impl fmt::Display for NetworkReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) => write!(f, "{} {} on '{}'", self.kind, ip, self.network),
            None => write!(f, "{} on '{}'", self.kind, self.network),
        }
    }
}
