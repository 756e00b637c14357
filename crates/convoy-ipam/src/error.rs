//! IPAM error types.

use std::net::IpAddr;

use thiserror::Error;

/// Errors raised while allocating, reserving, or releasing addresses.
///
/// Every variant names the network and, where one is involved, the address.
#[derive(Debug, Error)]
pub enum IpamError {
    #[error("no more IPs available on network '{network}'")]
    NoCapacity { network: String },

    #[error("IP '{ip}' is outside the ranges of network '{network}'")]
    OutOfRange { network: String, ip: IpAddr },

    #[error("IP '{ip}' on network '{network}' is already reserved by instance '{owner}'")]
    AlreadyOwned {
        network: String,
        ip: IpAddr,
        owner: String,
    },

    #[error("IP '{ip}' on network '{network}' is not reserved by any instance")]
    NotOwned { network: String, ip: IpAddr },

    #[error("reserved IP '{ip}' is outside the range of network '{network}'")]
    ReservedIpOutOfRange { network: String, ip: IpAddr },

    #[error("IP '{ip}' on network '{network}' is in the reserved range")]
    IpReserved { network: String, ip: IpAddr },

    #[error("IP '{ip}' on network '{network}' is {actual}, requested {expected}")]
    WrongType {
        network: String,
        ip: IpAddr,
        expected: String,
        actual: String,
    },

    #[error("IP '{ip}' on network '{network}' was reserved concurrently")]
    Conflict { network: String, ip: IpAddr },

    #[error("IP '{ip}' on network '{network}' does not belong to a subnet in availability zone '{az}'")]
    IpNotInAz {
        network: String,
        ip: IpAddr,
        az: String,
    },

    #[error("network '{network}' has no subnet serving availability zone '{az}'")]
    NoSubnetForAz { network: String, az: String },

    #[error("reservation for instance '{instance}' on network '{network}' has no IP")]
    IpMissing { network: String, instance: String },

    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    #[error("invalid address range '{0}'")]
    InvalidRange(String),

    #[error("state store error: {0}")]
    State(#[from] convoy_state::StateError),
}

pub type IpamResult<T> = Result<T, IpamError>;
