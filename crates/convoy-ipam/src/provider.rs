//! Resolves reservations against a deployment's networks.
//!
//! Routes each reservation to the subnet allocator that owns its address,
//! or, for dynamic allocation, tries the subnets serving the instance's AZ
//! in declaration order. Insert conflicts are retried here, bounded by
//! `max_attempts`; allocators never retry on their own.
//!
//! A provider built with `from_snapshot` reads the store's rows once and
//! keeps every later change in memory, so planning never writes state.

use std::collections::BTreeMap;
use std::net::IpAddr;

use tracing::{debug, info, warn};

use convoy_core::{AddressKind, Network, NetworkKind, Subnet};
use convoy_state::StateStore;

use crate::allocator::{InMemoryAllocator, IpAllocator, RangeAllocator, StoreAllocator};
use crate::book::{MemoryBook, ReservationBook};
use crate::error::{IpamError, IpamResult};
use crate::range::AddressRange;
use crate::reservation::{NetworkReservation, ReservationType};

struct SubnetSlot {
    subnet: Subnet,
    allocator: Box<dyn IpAllocator>,
}

enum NetworkPool {
    Manual(Vec<SubnetSlot>),
    /// Addresses come from the infrastructure; `azs` empty means any AZ.
    Dynamic { azs: Vec<String> },
}

fn dynamic_serves(azs: &[String], az: Option<&str>) -> bool {
    match az {
        Some(az) => azs.is_empty() || azs.iter().any(|a| a == az),
        None => true,
    }
}

/// Address authority for every network of one deployment.
pub struct IpProvider {
    networks: BTreeMap<String, NetworkPool>,
    max_attempts: u32,
}

impl IpProvider {
    /// An empty provider; networks are added with `add_subnet` and
    /// `add_dynamic_network`.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            networks: BTreeMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Provider whose reservations live only in memory.
    pub fn in_memory(networks: &[Network], max_attempts: u32) -> IpamResult<Self> {
        let mut provider = Self::new(max_attempts);
        for network in networks {
            provider.add_network(network, |net, range, pool| {
                InMemoryAllocator::in_memory(net, range, pool)
            })?;
        }
        Ok(provider)
    }

    /// Provider whose reservations live in the shared state store.
    pub fn with_store(
        networks: &[Network],
        store: &StateStore,
        max_attempts: u32,
    ) -> IpamResult<Self> {
        let mut provider = Self::new(max_attempts);
        for network in networks {
            provider.add_network(network, |net, range, pool| {
                StoreAllocator::with_store(net, range, pool, store.clone())
            })?;
        }
        Ok(provider)
    }

    /// In-memory provider seeded with the rows the state store holds now.
    ///
    /// Reservations and releases made through it never reach the store.
    pub fn from_snapshot(
        networks: &[Network],
        store: &StateStore,
        max_attempts: u32,
    ) -> IpamResult<Self> {
        let mut provider = Self::new(max_attempts);
        for network in networks {
            provider.add_network(network, |net, range, pool| {
                let rows = store
                    .list_ips_for_network(net)?
                    .into_iter()
                    .filter(|row| range.contains(row.address));
                RangeAllocator::new(net, range, pool, MemoryBook::from_records(rows))
            })?;
        }
        Ok(provider)
    }

    fn add_network<B, F>(&mut self, network: &Network, mut build: F) -> IpamResult<()>
    where
        B: ReservationBook + 'static,
        F: FnMut(&str, AddressRange, &[AddressRange]) -> IpamResult<RangeAllocator<B>>,
    {
        match network.kind {
            NetworkKind::Dynamic => self.add_dynamic_network(&network.name, network.azs.clone()),
            NetworkKind::Manual => {
                self.networks
                    .entry(network.name.clone())
                    .or_insert_with(|| NetworkPool::Manual(Vec::new()));
                for subnet in &network.subnets {
                    let range = AddressRange::from_network(&subnet.range);
                    let statics = parse_entries(&subnet.static_ips)?;
                    let mut allocator = build(&network.name, range, &statics)?;
                    blacklist_subnet(&mut allocator, subnet)?;
                    let free_dynamic = allocator.available_dynamic()?;
                    let free_static = allocator.available_static()?;
                    debug!(network = %network.name, subnet = %subnet.range, %free_dynamic, %free_static, "subnet ready");
                    self.add_subnet(&network.name, subnet.clone(), Box::new(allocator));
                }
            }
        }
        Ok(())
    }

    /// Register a network whose addresses the infrastructure assigns,
    /// spanning `azs` (all AZs when empty).
    pub fn add_dynamic_network(&mut self, name: &str, azs: Vec<String>) {
        self.networks
            .insert(name.to_string(), NetworkPool::Dynamic { azs });
    }

    /// Register the allocator of `subnet` on a manual network.
    pub fn add_subnet(&mut self, network: &str, subnet: Subnet, allocator: Box<dyn IpAllocator>) {
        let pool = self
            .networks
            .entry(network.to_string())
            .or_insert_with(|| NetworkPool::Manual(Vec::new()));
        match pool {
            NetworkPool::Manual(subnets) => subnets.push(SubnetSlot { subnet, allocator }),
            NetworkPool::Dynamic { .. } => {
                warn!(network, "ignoring subnet on dynamic network");
            }
        }
    }

    pub fn network_kind(&self, network: &str) -> Option<NetworkKind> {
        self.networks.get(network).map(|pool| match pool {
            NetworkPool::Manual(_) => NetworkKind::Manual,
            NetworkPool::Dynamic { .. } => NetworkKind::Dynamic,
        })
    }

    /// Whether an instance in `az` may hold `ip` on `network`.
    ///
    /// Dynamic networks check only the AZ. Manual networks need an address
    /// inside a subnet serving the AZ. Unknown networks never serve.
    pub fn serves(&self, network: &str, ip: Option<IpAddr>, az: Option<&str>) -> bool {
        match self.networks.get(network) {
            Some(NetworkPool::Dynamic { azs }) => dynamic_serves(azs, az),
            Some(NetworkPool::Manual(subnets)) => ip.is_some_and(|ip| {
                subnets
                    .iter()
                    .find(|s| s.allocator.range().contains(ip))
                    .is_some_and(|s| s.subnet.serves(az))
            }),
            None => false,
        }
    }

    /// Resolve a reservation for an instance placed in `az`.
    pub fn reserve(
        &mut self,
        reservation: NetworkReservation,
        az: Option<&str>,
    ) -> IpamResult<NetworkReservation> {
        let max_attempts = self.max_attempts;
        let pool = self
            .networks
            .get_mut(&reservation.network)
            .ok_or_else(|| IpamError::UnknownNetwork(reservation.network.clone()))?;

        let subnets = match pool {
            NetworkPool::Dynamic { azs } => {
                if let Some(az) = az {
                    if !dynamic_serves(azs, Some(az)) {
                        return Err(IpamError::NoSubnetForAz {
                            network: reservation.network.clone(),
                            az: az.to_string(),
                        });
                    }
                }
                let ip = reservation.ip;
                return Ok(reservation.resolve(ip, ReservationType::Dynamic));
            }
            NetworkPool::Manual(subnets) => subnets,
        };

        match reservation.ip {
            Some(ip) => {
                let requested = match reservation.kind {
                    ReservationType::Static => Some(AddressKind::Static),
                    ReservationType::Dynamic => Some(AddressKind::Dynamic),
                    ReservationType::Existing(_) => None,
                };
                let slot = subnets
                    .iter_mut()
                    .find(|s| s.allocator.range().contains(ip))
                    .ok_or_else(|| IpamError::OutOfRange {
                        network: reservation.network.clone(),
                        ip,
                    })?;
                if let Some(az) = az {
                    if !slot.subnet.serves(Some(az)) {
                        return Err(IpamError::IpNotInAz {
                            network: reservation.network.clone(),
                            ip,
                            az: az.to_string(),
                        });
                    }
                }
                let kind = slot.allocator.reserve(ip, &reservation.instance, requested)?;
                Ok(reservation.resolve(Some(ip), kind.into()))
            }
            None => {
                let ip = allocate(subnets, &reservation, az, max_attempts)?;
                info!(
                    network = %reservation.network,
                    instance = %reservation.instance,
                    %ip,
                    "allocated dynamic reservation"
                );
                Ok(reservation.resolve(Some(ip), ReservationType::Dynamic))
            }
        }
    }

    /// Hand a resolved reservation's address back to its subnet.
    pub fn release(&mut self, reservation: &NetworkReservation) -> IpamResult<()> {
        let pool = self
            .networks
            .get_mut(&reservation.network)
            .ok_or_else(|| IpamError::UnknownNetwork(reservation.network.clone()))?;
        let subnets = match pool {
            NetworkPool::Dynamic { .. } => return Ok(()),
            NetworkPool::Manual(subnets) => subnets,
        };
        let ip = reservation.ip.ok_or_else(|| IpamError::IpMissing {
            network: reservation.network.clone(),
            instance: reservation.instance.clone(),
        })?;
        let slot = subnets
            .iter_mut()
            .find(|s| s.allocator.range().contains(ip))
            .ok_or_else(|| IpamError::NotOwned {
                network: reservation.network.clone(),
                ip,
            })?;
        slot.allocator.release(ip)
    }
}

fn allocate(
    subnets: &mut [SubnetSlot],
    reservation: &NetworkReservation,
    az: Option<&str>,
    max_attempts: u32,
) -> IpamResult<IpAddr> {
    let mut candidates = subnets.iter_mut().filter(|s| s.subnet.serves(az)).peekable();
    if candidates.peek().is_none() {
        return Err(match az {
            Some(az) => IpamError::NoSubnetForAz {
                network: reservation.network.clone(),
                az: az.to_string(),
            },
            None => IpamError::NoCapacity {
                network: reservation.network.clone(),
            },
        });
    }

    let mut conflicts = 0;
    for slot in candidates {
        loop {
            match slot.allocator.allocate_dynamic(&reservation.instance) {
                Ok(ip) => return Ok(ip),
                Err(IpamError::NoCapacity { .. }) => break,
                Err(IpamError::Conflict { network, ip }) => {
                    conflicts += 1;
                    if conflicts >= max_attempts {
                        warn!(%network, %ip, conflicts, "giving up on dynamic allocation");
                        return Err(IpamError::Conflict { network, ip });
                    }
                    debug!(%network, %ip, conflicts, "retrying dynamic allocation");
                }
                Err(e) => return Err(e),
            }
        }
    }
    Err(IpamError::NoCapacity {
        network: reservation.network.clone(),
    })
}

fn parse_entries(entries: &[String]) -> IpamResult<Vec<AddressRange>> {
    entries.iter().map(|e| AddressRange::parse_entry(e)).collect()
}

/// Exclude the network address, the IPv4 broadcast, the gateway, and the
/// subnet's reserved entries.
fn blacklist_subnet(allocator: &mut dyn IpAllocator, subnet: &Subnet) -> IpamResult<()> {
    let range = *allocator.range();
    allocator.blacklist(range.first())?;
    if !range.is_ipv6() && subnet.range.prefix() < 31 {
        allocator.blacklist(range.last())?;
    }
    if let Some(gateway) = subnet.gateway {
        allocator.blacklist(gateway)?;
    }
    for entry in parse_entries(&subnet.reserved)? {
        allocator.blacklist_range(entry)?;
    }
    Ok(())
}
