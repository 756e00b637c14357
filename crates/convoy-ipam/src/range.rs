//! Inclusive address ranges over IPv4 and IPv6.
//!
//! Addresses are handled as `u128` offsets so both families share one
//! arithmetic path; the family is carried alongside to convert back.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;

use crate::error::{IpamError, IpamResult};

/// Numeric value of an address.
pub fn to_bits(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Address for a numeric value in the given family.
pub fn from_bits(bits: u128, v6: bool) -> IpAddr {
    if v6 {
        IpAddr::V6(Ipv6Addr::from(bits))
    } else {
        IpAddr::V4(Ipv4Addr::from(bits as u32))
    }
}

/// An inclusive `[first, last]` address range of one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    first: u128,
    last: u128,
    v6: bool,
}

impl AddressRange {
    pub fn new(first: IpAddr, last: IpAddr) -> IpamResult<Self> {
        if first.is_ipv6() != last.is_ipv6() || to_bits(first) > to_bits(last) {
            return Err(IpamError::InvalidRange(format!("{first} - {last}")));
        }
        Ok(Self {
            first: to_bits(first),
            last: to_bits(last),
            v6: first.is_ipv6(),
        })
    }

    /// Every address of a CIDR block, network address included.
    pub fn from_network(network: &IpNetwork) -> Self {
        let (bits, width, v6) = match network {
            IpNetwork::V4(n) => (to_bits(IpAddr::V4(n.network())), 32, false),
            IpNetwork::V6(n) => (to_bits(IpAddr::V6(n.network())), 128, true),
        };
        let host_bits = width - u32::from(network.prefix());
        let span = if host_bits >= 128 {
            u128::MAX
        } else {
            (1u128 << host_bits) - 1
        };
        Self {
            first: bits,
            last: bits | span,
            v6,
        }
    }

    /// Parse a `reserved`/`static` entry: one address or `first - last`.
    pub fn parse_entry(entry: &str) -> IpamResult<Self> {
        let invalid = || IpamError::InvalidRange(entry.to_string());
        match entry.split_once('-') {
            Some((first, last)) => {
                let first: IpAddr = first.trim().parse().map_err(|_| invalid())?;
                let last: IpAddr = last.trim().parse().map_err(|_| invalid())?;
                Self::new(first, last)
            }
            None => {
                let ip: IpAddr = entry.trim().parse().map_err(|_| invalid())?;
                Ok(Self::single(ip))
            }
        }
    }

    /// A range holding only `ip`.
    pub fn single(ip: IpAddr) -> Self {
        Self {
            first: to_bits(ip),
            last: to_bits(ip),
            v6: ip.is_ipv6(),
        }
    }

    pub fn first(&self) -> IpAddr {
        from_bits(self.first, self.v6)
    }

    pub fn last(&self) -> IpAddr {
        from_bits(self.last, self.v6)
    }

    pub fn is_ipv6(&self) -> bool {
        self.v6
    }

    pub(crate) fn first_bits(&self) -> u128 {
        self.first
    }

    pub(crate) fn last_bits(&self) -> u128 {
        self.last
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        ip.is_ipv6() == self.v6 && self.contains_bits(to_bits(ip))
    }

    /// Membership of a numeric address of this range's family.
    pub(crate) fn contains_bits(&self, bits: u128) -> bool {
        (self.first..=self.last).contains(&bits)
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &AddressRange) -> bool {
        other.v6 == self.v6 && other.first >= self.first && other.last <= self.last
    }

    /// Number of addresses, saturating for a full IPv6 space.
    pub fn len(&self) -> u128 {
        (self.last - self.first).saturating_add(1)
    }

    /// Never true: a range holds at least one address.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Number of addresses covered by `ranges`, overlaps counted once.
pub(crate) fn covered<'a>(ranges: impl IntoIterator<Item = &'a AddressRange>) -> u128 {
    let mut spans: Vec<(u128, u128)> = ranges.into_iter().map(|r| (r.first, r.last)).collect();
    spans.sort_unstable();

    let mut total = 0u128;
    let mut current: Option<(u128, u128)> = None;
    for (first, last) in spans {
        current = match current {
            Some((f, l)) if first <= l.saturating_add(1) => Some((f, l.max(last))),
            Some((f, l)) => {
                total = total.saturating_add((l - f).saturating_add(1));
                Some((first, last))
            }
            None => Some((first, last)),
        };
    }
    if let Some((f, l)) = current {
        total = total.saturating_add((l - f).saturating_add(1));
    }
    total
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.first(), self.last())
    }
}
