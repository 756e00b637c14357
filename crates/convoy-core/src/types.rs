//! Shared types used across Convoy crates.
//!
//! Desired-state types come from an already-validated deployment manifest;
//! existing-state types mirror what the state store persists. All of them
//! are plain values: planning stages return annotated copies instead of
//! mutating shared objects.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// Name of an availability zone.
pub type AzName = String;

/// Stable identifier of a persisted instance.
pub type InstanceUuid = String;

// ── Availability zones ─────────────────────────────────────────────

/// An availability zone from cloud config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityZone {
    pub name: AzName,
    #[serde(default)]
    pub cloud_properties: BTreeMap<String, serde_json::Value>,
}

impl AvailabilityZone {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cloud_properties: BTreeMap::new(),
        }
    }
}

// ── Networks ───────────────────────────────────────────────────────

/// How addresses on a network are handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// Addresses are allocated by the director from declared subnets.
    #[default]
    Manual,
    /// Addresses are assigned by the infrastructure and reported by the agent.
    Dynamic,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Manual => f.write_str("manual"),
            NetworkKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A deployment network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: NetworkKind,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    /// AZs a dynamic network spans. Manual networks scope AZs per subnet.
    #[serde(default)]
    pub azs: Vec<AzName>,
}

impl Network {
    /// The subnet whose range contains `ip`, if any.
    pub fn subnet_for(&self, ip: IpAddr) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.range.contains(ip))
    }
}

/// A CIDR range inside a manual network.
///
/// `reserved` and `static_ips` entries are either a single address or an
/// inclusive `first - last` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub range: IpNetwork,
    #[serde(default)]
    pub gateway: Option<IpAddr>,
    #[serde(default)]
    pub reserved: Vec<String>,
    #[serde(default, rename = "static")]
    pub static_ips: Vec<String>,
    #[serde(default)]
    pub azs: Vec<AzName>,
}

impl Subnet {
    /// The AZ an address from this subnet lands in: the first listed AZ.
    pub fn az(&self) -> Option<&str> {
        self.azs.first().map(String::as_str)
    }

    /// Whether this subnet can serve an instance placed in `az`.
    ///
    /// Subnets without AZs serve everything; instances without an AZ can
    /// use any subnet.
    pub fn serves(&self, az: Option<&str>) -> bool {
        match az {
            Some(az) => self.azs.is_empty() || self.azs.iter().any(|a| a == az),
            None => true,
        }
    }
}

// ── Desired jobs ───────────────────────────────────────────────────

/// A network attachment of a desired job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNetwork {
    pub name: String,
    #[serde(default)]
    pub static_ips: Vec<IpAddr>,
}

/// A legacy job whose instances are folded into a renamed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigratedFrom {
    pub name: String,
    #[serde(default)]
    pub az: Option<AzName>,
}

/// A desired instance group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredJob {
    pub name: String,
    pub instances: u32,
    #[serde(default)]
    pub azs: Vec<AzName>,
    #[serde(default)]
    pub networks: Vec<JobNetwork>,
    #[serde(default)]
    pub migrated_from: Vec<MigratedFrom>,
}

impl DesiredJob {
    pub fn new(name: &str, instances: u32) -> Self {
        Self {
            name: name.to_string(),
            instances,
            azs: Vec::new(),
            networks: Vec::new(),
            migrated_from: Vec::new(),
        }
    }

    pub fn with_azs(mut self, azs: &[&str]) -> Self {
        self.azs = azs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_network(mut self, name: &str, static_ips: Vec<IpAddr>) -> Self {
        self.networks.push(JobNetwork {
            name: name.to_string(),
            static_ips,
        });
        self
    }

    pub fn with_migrated_from(mut self, name: &str, az: Option<&str>) -> Self {
        self.migrated_from.push(MigratedFrom {
            name: name.to_string(),
            az: az.map(str::to_string),
        });
        self
    }

    /// Whether any network of this job pins static IPs.
    pub fn uses_static_ips(&self) -> bool {
        self.networks.iter().any(|n| !n.static_ips.is_empty())
    }

    /// One unplaced slot per desired instance.
    pub fn desired_instances(&self) -> Vec<DesiredInstance> {
        (0..self.instances)
            .map(|_| DesiredInstance::new(&self.name))
            .collect()
    }
}

/// One desired slot of a job.
///
/// Placement, index assignment and bootstrap election each return an
/// annotated copy via the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredInstance {
    pub job: String,
    pub az: Option<AzName>,
    pub index: Option<u32>,
    pub bootstrap: bool,
    /// Static IP pinned per network name.
    #[serde(default)]
    pub static_ips: BTreeMap<String, IpAddr>,
}

impl DesiredInstance {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            az: None,
            index: None,
            bootstrap: false,
            static_ips: BTreeMap::new(),
        }
    }

    pub fn with_az(self, az: Option<&str>) -> Self {
        Self {
            az: az.map(str::to_string),
            ..self
        }
    }

    pub fn with_index(self, index: u32) -> Self {
        Self {
            index: Some(index),
            ..self
        }
    }

    pub fn with_bootstrap(self, bootstrap: bool) -> Self {
        Self { bootstrap, ..self }
    }

    pub fn with_static_ip(mut self, network: &str, ip: IpAddr) -> Self {
        self.static_ips.insert(network.to_string(), ip);
        self
    }
}

// ── Existing state ─────────────────────────────────────────────────

/// How a persisted address row is held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// Taken from the subnet's declared static pool.
    Static,
    /// Allocated from the remaining range.
    #[default]
    Dynamic,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressKind::Static => f.write_str("static"),
            AddressKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A persisted IP reservation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressRecord {
    pub network: String,
    pub address: IpAddr,
    #[serde(default)]
    pub kind: AddressKind,
    /// Owning instance.
    #[serde(default)]
    pub owner: Option<InstanceUuid>,
}

impl IpAddressRecord {
    pub fn new(network: &str, address: IpAddr, kind: AddressKind, owner: Option<&str>) -> Self {
        Self {
            network: network.to_string(),
            address,
            kind,
            owner: owner.map(str::to_string),
        }
    }

    /// Composite key: `{network}:{address}`.
    pub fn table_key(&self) -> String {
        ip_table_key(&self.network, self.address)
    }
}

/// Composite key of an IP row.
pub fn ip_table_key(network: &str, address: IpAddr) -> String {
    format!("{network}:{address}")
}

/// Read-only view of a persisted instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingInstance {
    pub job_name: String,
    pub index: u32,
    pub uuid: InstanceUuid,
    #[serde(default)]
    pub az: Option<AzName>,
    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddressRecord>,
}

impl ExistingInstance {
    pub fn new(job_name: &str, index: u32, uuid: &str, az: Option<&str>) -> Self {
        Self {
            job_name: job_name.to_string(),
            index,
            uuid: uuid.to_string(),
            az: az.map(str::to_string),
            bootstrap: false,
            ip_addresses: Vec::new(),
        }
    }

    pub fn with_bootstrap(self, bootstrap: bool) -> Self {
        Self { bootstrap, ..self }
    }

    pub fn with_az(self, az: Option<&str>) -> Self {
        Self {
            az: az.map(str::to_string),
            ..self
        }
    }

    pub fn with_ip(mut self, network: &str, address: IpAddr, kind: AddressKind) -> Self {
        let owner = self.uuid.clone();
        self.ip_addresses
            .push(IpAddressRecord::new(network, address, kind, Some(&owner)));
        self
    }

    /// Composite key: `{job_name}:{uuid}`.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.job_name, self.uuid)
    }

    /// Whether this instance holds `ip` on `network`.
    pub fn holds(&self, network: &str, ip: IpAddr) -> bool {
        self.ip_addresses
            .iter()
            .any(|r| r.network == network && r.address == ip)
    }
}

impl fmt::Display for ExistingInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.job_name, self.uuid, self.index)
    }
}
