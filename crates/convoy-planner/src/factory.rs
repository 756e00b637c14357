//! Instance plan factory.
//!
//! Turns placed instances into `InstancePlan`s: fetches or creates the
//! instance through the repository and decides, per network, which
//! reservations to keep, which to create, and which to release.

use std::collections::HashMap;
use std::net::IpAddr;

use tracing::{debug, info, warn};

use convoy_core::{DesiredInstance, DesiredJob, ExistingInstance, NetworkKind};
use convoy_ipam::{IpProvider, IpamError, NetworkReservation, ReservationType};
use convoy_placement::Placed;

use crate::error::PlannerResult;
use crate::plan::{InstanceHandle, InstancePlan, NetworkPlan};
use crate::repository::InstanceRepository;
use crate::snapshot::AgentState;

/// Builds instance plans for one reconciliation pass.
pub struct InstancePlanFactory<'a, R> {
    repo: &'a mut R,
    ipam: &'a mut IpProvider,
    agent_states: &'a HashMap<String, AgentState>,
    /// Reservations of existing instances, by uuid.
    existing_reservations: HashMap<String, Vec<NetworkReservation>>,
}

impl<'a, R: InstanceRepository> InstancePlanFactory<'a, R> {
    pub fn new(
        repo: &'a mut R,
        ipam: &'a mut IpProvider,
        agent_states: &'a HashMap<String, AgentState>,
    ) -> Self {
        Self {
            repo,
            ipam,
            agent_states,
            existing_reservations: HashMap::new(),
        }
    }

    /// Reserve the addresses existing instances already hold.
    ///
    /// Runs before any new address is handed out so running instances keep
    /// theirs. Addresses the current networks no longer cover stay
    /// unresolved and end up released.
    pub fn reserve_existing(&mut self, instances: &[ExistingInstance]) -> PlannerResult<()> {
        for instance in instances {
            let mut held = Vec::new();
            for reservation in self.recorded_reservations(instance) {
                let fallback = reservation.clone();
                match self.ipam.reserve(reservation, None) {
                    Ok(resolved) => held.push(resolved),
                    Err(
                        e @ (IpamError::OutOfRange { .. }
                        | IpamError::IpReserved { .. }
                        | IpamError::UnknownNetwork(_)),
                    ) => {
                        warn!(instance = %instance, reservation = %fallback, error = %e, "existing address no longer reservable");
                        held.push(fallback);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            self.existing_reservations.insert(instance.uuid.clone(), held);
        }
        Ok(())
    }

    /// Persisted IP rows of `instance`, or what its agent reported when it
    /// has none.
    fn recorded_reservations(&self, instance: &ExistingInstance) -> Vec<NetworkReservation> {
        if !instance.ip_addresses.is_empty() {
            return instance
                .ip_addresses
                .iter()
                .map(|record| NetworkReservation::from_record(&instance.uuid, record))
                .collect();
        }
        let Some(state) = self.agent_states.get(&instance.uuid) else {
            return Vec::new();
        };
        reported_networks(state)
            .into_iter()
            .map(|(network, ip)| {
                let kind = self.ipam.network_kind(&network).unwrap_or(NetworkKind::Dynamic);
                NetworkReservation::existing(&instance.uuid, &network, ip, kind)
            })
            .collect()
    }

    /// Plan one placed instance of `job`.
    pub fn plan(&mut self, job: &DesiredJob, placed: Placed) -> PlannerResult<InstancePlan> {
        match placed {
            Placed::New(desired) => self.plan_new(job, desired),
            Placed::Existing { desired, existing } => self.plan_existing(job, desired, existing),
            Placed::Obsolete(existing) => Ok(self.plan_obsolete(existing)),
        }
    }

    fn plan_new(&mut self, job: &DesiredJob, desired: DesiredInstance) -> PlannerResult<InstancePlan> {
        let index = desired.index.unwrap_or_default();
        let instance = self.repo.create(&desired, index)?;

        let mut network_plans = Vec::with_capacity(job.networks.len());
        for network in &job.networks {
            let reservation = self.reserve_for(&instance, &desired, &network.name)?;
            network_plans.push(NetworkPlan::keep(reservation));
        }

        info!(job = %job.name, uuid = %instance.uuid, index, az = ?desired.az, "planned new instance");
        Ok(InstancePlan {
            existing: None,
            desired: Some(desired),
            instance,
            network_plans,
            obsolete: false,
        })
    }

    fn plan_existing(
        &mut self,
        job: &DesiredJob,
        desired: DesiredInstance,
        existing: ExistingInstance,
    ) -> PlannerResult<InstancePlan> {
        let snapshot = self.agent_states.get(&existing.uuid);
        let instance = self.repo.fetch_existing(&desired, &existing, snapshot)?;
        let mut held = self.existing_reservations.remove(&existing.uuid).unwrap_or_default();

        let mut network_plans = Vec::with_capacity(job.networks.len() + held.len());
        for network in &job.networks {
            let wanted = desired.static_ips.get(&network.name).copied();
            let kept = held
                .iter()
                .position(|r| self.still_fits(r, &network.name, wanted, desired.az.as_deref()));
            match kept {
                Some(pos) => {
                    let reservation = held.remove(pos);
                    debug!(uuid = %instance.uuid, reservation = %reservation, "keeping reservation");
                    network_plans.push(NetworkPlan::keep(reservation));
                }
                None => {
                    let reservation = self.reserve_for(&instance, &desired, &network.name)?;
                    network_plans.push(NetworkPlan::keep(reservation));
                }
            }
        }
        for reservation in held {
            debug!(uuid = %instance.uuid, reservation = %reservation, "reservation is obsolete");
            network_plans.push(NetworkPlan::release(reservation));
        }

        debug!(job = %job.name, uuid = %instance.uuid, index = instance.index, az = ?instance.az, "planned existing instance");
        Ok(InstancePlan {
            existing: Some(existing),
            desired: Some(desired),
            instance,
            network_plans,
            obsolete: false,
        })
    }

    /// Plan the deletion of an instance no slot wants.
    pub fn plan_obsolete(&mut self, existing: ExistingInstance) -> InstancePlan {
        let held = self.existing_reservations.remove(&existing.uuid).unwrap_or_default();
        info!(instance = %existing, "planned obsolete instance");
        InstancePlan {
            instance: InstanceHandle::from_existing(&existing),
            existing: Some(existing),
            desired: None,
            network_plans: held.into_iter().map(NetworkPlan::release).collect(),
            obsolete: true,
        }
    }

    /// Whether an existing reservation still satisfies the job's network.
    fn still_fits(
        &self,
        reservation: &NetworkReservation,
        network: &str,
        wanted: Option<IpAddr>,
        az: Option<&str>,
    ) -> bool {
        if !reservation.resolved || reservation.network != network {
            return false;
        }
        match (wanted, reservation.ip) {
            (Some(wanted), Some(ip)) => ip == wanted && reservation.kind == ReservationType::Static,
            (None, Some(ip)) => {
                reservation.kind != ReservationType::Static && self.ipam.serves(network, Some(ip), az)
            }
            (None, None) => {
                self.ipam.network_kind(network) == Some(NetworkKind::Dynamic)
                    && self.ipam.serves(network, None, az)
            }
            (Some(_), None) => false,
        }
    }

    fn reserve_for(
        &mut self,
        instance: &InstanceHandle,
        desired: &DesiredInstance,
        network: &str,
    ) -> PlannerResult<NetworkReservation> {
        let request = match desired.static_ips.get(network) {
            Some(ip) => NetworkReservation::new_static(&instance.uuid, network, *ip),
            None => NetworkReservation::new_dynamic(&instance.uuid, network),
        };
        Ok(self.ipam.reserve(request, desired.az.as_deref())?)
    }
}

/// `networks.<name>.ip` entries of an agent state.
fn reported_networks(state: &AgentState) -> Vec<(String, Option<IpAddr>)> {
    let Some(networks) = state.get("networks").and_then(|n| n.as_object()) else {
        return Vec::new();
    };
    networks
        .iter()
        .map(|(name, settings)| {
            let ip = settings
                .get("ip")
                .and_then(|ip| ip.as_str())
                .and_then(|ip| ip.parse().ok());
            (name.clone(), ip)
        })
        .collect()
}
