//! Placement error types.

use std::net::IpAddr;

use thiserror::Error;

/// Errors that abort placement. None of them are retried.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(
        "Failed to migrate instance group '{legacy}' to '{job}'. A deployment can not migrate an instance group and also specify it. Please remove instance group '{legacy}'."
    )]
    MigrationSourceStillExists { legacy: String, job: String },

    #[error(
        "Failed to migrate instance group '{legacy}' to '{job}'. An instance group may be migrated to only one instance group."
    )]
    DuplicateMigrationSource { legacy: String, job: String },

    #[error(
        "Failed to migrate instance group '{legacy}' to '{job}'. No instances of '{legacy}' exist in the deployment."
    )]
    UnknownMigrationSource { legacy: String, job: String },

    #[error(
        "Failed to migrate instance group '{legacy}' to '{job}', availability zone of '{legacy}' is not specified"
    )]
    MigrationAzUnspecified { legacy: String, job: String },

    #[error(
        "Instance group '{job}' has {instances} instances but {ips} static IPs on network '{network}'"
    )]
    StaticIpCountMismatch {
        job: String,
        network: String,
        instances: usize,
        ips: usize,
    },

    #[error("Instance group '{job}' uses static IP '{ip}' which is outside the subnets of network '{network}'")]
    StaticIpOutsideSubnets {
        job: String,
        network: String,
        ip: IpAddr,
    },

    #[error(
        "Instance group '{job}' uses static IP '{ip}' on network '{network}' whose subnet has no availability zone"
    )]
    StaticIpWithoutAz {
        job: String,
        network: String,
        ip: IpAddr,
    },

    #[error(
        "Instance group '{job}' uses static IP '{ip}' which belongs to availability zone '{az}' not listed for the instance group"
    )]
    StaticIpAzNotDesired { job: String, ip: IpAddr, az: String },

    #[error(
        "Instance group '{job}' static IPs of instance {slot} resolve to different availability zones '{first}' and '{second}'"
    )]
    StaticIpAzMismatch {
        job: String,
        slot: usize,
        first: String,
        second: String,
    },

    #[error("Instance group '{job}' references unknown network '{network}'")]
    UnknownNetwork { job: String, network: String },
}

pub type PlacementResult<T> = Result<T, PlacementError>;
