//! Instance and network plans, the output of a reconciliation pass.

use serde::Serialize;

use convoy_core::{AddressKind, AzName, DesiredInstance, ExistingInstance, InstanceUuid};
use convoy_ipam::NetworkReservation;
use convoy_rollout::RolloutUnit;

/// The repository's view of an instance a plan acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceHandle {
    pub uuid: InstanceUuid,
    pub job: String,
    pub index: u32,
    pub az: Option<AzName>,
    pub bootstrap: bool,
}

impl InstanceHandle {
    /// Handle of an instance that is only going to be deleted.
    pub fn from_existing(existing: &ExistingInstance) -> Self {
        Self {
            uuid: existing.uuid.clone(),
            job: existing.job_name.clone(),
            index: existing.index,
            az: existing.az.clone(),
            bootstrap: existing.bootstrap,
        }
    }
}

/// One reservation of an instance and whether apply must release it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkPlan {
    pub reservation: NetworkReservation,
    pub obsolete: bool,
}

impl NetworkPlan {
    pub fn keep(reservation: NetworkReservation) -> Self {
        Self {
            reservation,
            obsolete: false,
        }
    }

    pub fn release(reservation: NetworkReservation) -> Self {
        Self {
            reservation,
            obsolete: true,
        }
    }
}

/// What happens to one instance.
///
/// No `existing` means the instance is created; no `desired` means it is
/// deleted; both means it is kept and updated in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstancePlan {
    pub existing: Option<ExistingInstance>,
    pub desired: Option<DesiredInstance>,
    pub instance: InstanceHandle,
    pub network_plans: Vec<NetworkPlan>,
    pub obsolete: bool,
}

impl InstancePlan {
    pub fn is_new(&self) -> bool {
        self.existing.is_none()
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    pub fn is_bootstrap(&self) -> bool {
        self.desired.as_ref().is_some_and(|d| d.bootstrap)
    }

    pub fn index(&self) -> u32 {
        self.instance.index
    }

    /// Reservations apply keeps or creates.
    pub fn desired_reservations(&self) -> impl Iterator<Item = &NetworkReservation> {
        self.network_plans
            .iter()
            .filter(|p| !p.obsolete)
            .map(|p| &p.reservation)
    }

    /// Reservations apply releases.
    pub fn obsolete_reservations(&self) -> impl Iterator<Item = &NetworkReservation> {
        self.network_plans
            .iter()
            .filter(|p| p.obsolete)
            .map(|p| &p.reservation)
    }

    /// The instance record this plan leaves behind once applied.
    ///
    /// Reservations without an address (dynamic networks before the agent
    /// reports one) are not recorded.
    pub fn to_record(&self) -> ExistingInstance {
        let mut record = ExistingInstance::new(
            &self.instance.job,
            self.instance.index,
            &self.instance.uuid,
            self.instance.az.as_deref(),
        )
        .with_bootstrap(self.instance.bootstrap);
        for reservation in self.desired_reservations() {
            let Some(ip) = reservation.ip else {
                continue;
            };
            let kind = if reservation.is_static() {
                AddressKind::Static
            } else {
                AddressKind::Dynamic
            };
            record = record.with_ip(&reservation.network, ip, kind);
        }
        record
    }

    /// Flag or clear bootstrap on the plan and its handle.
    pub fn with_bootstrap(self, bootstrap: bool) -> Self {
        Self {
            desired: self.desired.map(|d| d.with_bootstrap(bootstrap)),
            instance: InstanceHandle {
                bootstrap,
                ..self.instance
            },
            ..self
        }
    }
}

impl RolloutUnit for InstancePlan {
    fn job_name(&self) -> &str {
        &self.instance.job
    }

    fn uuid(&self) -> &str {
        &self.instance.uuid
    }

    fn az(&self) -> Option<&str> {
        self.instance.az.as_deref()
    }

    fn is_bootstrap(&self) -> bool {
        InstancePlan::is_bootstrap(self)
    }

    fn is_obsolete(&self) -> bool {
        self.obsolete
    }
}
