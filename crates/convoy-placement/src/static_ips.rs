//! Placement for jobs that pin static IPs.
//!
//! The AZ of each slot is derived from the subnet that owns its static IP
//! rather than chosen. Slot `i` consumes the `i`-th static IP of every
//! static network of the job. An existing instance is reused first by the
//! slot whose static IP it already holds. Instances holding none of the
//! wanted IPs then fill the remaining slots of their own AZ, lowest index
//! first, and change address in place instead of being recreated.

use std::net::IpAddr;

use tracing::debug;

use convoy_core::{DesiredInstance, DesiredJob, ExistingInstance, Network};

use crate::error::{PlacementError, PlacementResult};
use crate::placed::Placed;

/// Place the slots of a static-IP job.
///
/// The result lists the slots in static-IP order followed by obsolete
/// instances in index order.
pub fn place_by_static_ips(
    job: &DesiredJob,
    networks: &[Network],
    desired: Vec<DesiredInstance>,
    mut existing: Vec<ExistingInstance>,
) -> PlacementResult<Vec<Placed>> {
    let pinned = static_networks(job, networks, desired.len())?;
    existing.sort_by_key(|e| e.index);

    let mut slots = Vec::with_capacity(desired.len());
    for (slot, instance) in desired.into_iter().enumerate() {
        let mut instance = instance;
        let mut slot_az: Option<String> = None;

        for (network, ips) in &pinned {
            let ip = ips[slot];
            if let Some(az) = az_for_ip(job, network, ip)? {
                match slot_az.as_deref() {
                    Some(first) if first != az => {
                        return Err(PlacementError::StaticIpAzMismatch {
                            job: job.name.clone(),
                            slot,
                            first: first.to_string(),
                            second: az,
                        });
                    }
                    Some(_) => {}
                    None => slot_az = Some(az),
                }
            }
            instance = instance.with_static_ip(&network.name, ip);
        }

        slots.push(instance.with_az(slot_az.as_deref()));
    }

    let mut matched: Vec<Option<ExistingInstance>> = Vec::with_capacity(slots.len());
    for (slot, instance) in slots.iter().enumerate() {
        let holder = existing.iter().position(|e| {
            instance
                .static_ips
                .iter()
                .any(|(network, ip)| e.holds(network, *ip))
        });
        matched.push(holder.map(|pos| {
            let found = existing.remove(pos);
            debug!(job = %job.name, slot, existing = %found, "reusing static ip holder");
            found
        }));
    }

    for (slot, instance) in slots.iter().enumerate() {
        if matched[slot].is_some() {
            continue;
        }
        if let Some(pos) = existing.iter().position(|e| e.az == instance.az) {
            let found = existing.remove(pos);
            debug!(job = %job.name, slot, existing = %found, az = ?instance.az, "reusing instance for changed static ip");
            matched[slot] = Some(found);
        }
    }

    let mut placed = Vec::with_capacity(slots.len() + existing.len());
    for (slot, (instance, found)) in slots.into_iter().zip(matched).enumerate() {
        match found {
            Some(found) => placed.push(Placed::Existing {
                desired: instance,
                existing: found,
            }),
            None => {
                debug!(job = %job.name, slot, az = ?instance.az, "placing new static ip instance");
                placed.push(Placed::New(instance));
            }
        }
    }

    placed.extend(existing.into_iter().map(Placed::Obsolete));
    Ok(placed)
}

/// The job's static networks with their IP lists, validated against the
/// slot count.
fn static_networks<'a>(
    job: &'a DesiredJob,
    networks: &'a [Network],
    slots: usize,
) -> PlacementResult<Vec<(&'a Network, &'a [IpAddr])>> {
    let mut pinned = Vec::new();
    for job_net in job.networks.iter().filter(|n| !n.static_ips.is_empty()) {
        let network = networks
            .iter()
            .find(|n| n.name == job_net.name)
            .ok_or_else(|| PlacementError::UnknownNetwork {
                job: job.name.clone(),
                network: job_net.name.clone(),
            })?;
        if job_net.static_ips.len() != slots {
            return Err(PlacementError::StaticIpCountMismatch {
                job: job.name.clone(),
                network: job_net.name.clone(),
                instances: slots,
                ips: job_net.static_ips.len(),
            });
        }
        pinned.push((network, job_net.static_ips.as_slice()));
    }
    Ok(pinned)
}

/// AZ a static IP puts its slot in. `None` when the job is not AZ-aware.
fn az_for_ip(job: &DesiredJob, network: &Network, ip: IpAddr) -> PlacementResult<Option<String>> {
    let subnet = network
        .subnet_for(ip)
        .ok_or_else(|| PlacementError::StaticIpOutsideSubnets {
            job: job.name.clone(),
            network: network.name.clone(),
            ip,
        })?;
    if job.azs.is_empty() {
        return Ok(None);
    }
    let az = subnet.az().ok_or_else(|| PlacementError::StaticIpWithoutAz {
        job: job.name.clone(),
        network: network.name.clone(),
        ip,
    })?;
    if !job.azs.iter().any(|a| a == az) {
        return Err(PlacementError::StaticIpAzNotDesired {
            job: job.name.clone(),
            ip,
            az: az.to_string(),
        });
    }
    Ok(Some(az.to_string()))
}
