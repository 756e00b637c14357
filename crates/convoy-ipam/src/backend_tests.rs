//! Allocator behaviour, checked once per reservation book.

use std::net::IpAddr;

use convoy_core::AddressKind;
use convoy_state::StateStore;

use crate::allocator::{InMemoryAllocator, IpAllocator, StoreAllocator};
use crate::error::IpamError;
use crate::range::AddressRange;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn range(first: &str, last: &str) -> AddressRange {
    AddressRange::new(ip(first), ip(last)).unwrap()
}

fn cidr(s: &str) -> AddressRange {
    AddressRange::from_network(&s.parse().unwrap())
}

fn entry(s: &str) -> AddressRange {
    AddressRange::parse_entry(s).unwrap()
}

macro_rules! allocator_behaviour {
    ($name:ident, $ty:ty, $ctor:expr) => {
        mod $name {
            use super::*;

            fn make(range: AddressRange, statics: &[AddressRange]) -> $ty {
                ($ctor)(range, statics)
            }

            /// A /24 with its network address blacklisted and a small static pool.
            fn subnet() -> $ty {
                let r = cidr("10.0.0.0/24");
                let mut a = make(r, &[entry("10.0.0.200 - 10.0.0.210")]);
                a.blacklist(r.first()).unwrap();
                a
            }

            #[test]
            fn first_allocation_skips_network_address() {
                let mut a = subnet();
                assert_eq!(a.allocate_dynamic("i0").unwrap(), ip("10.0.0.1"));
            }

            #[test]
            fn allocations_are_sequential() {
                let mut a = subnet();
                assert_eq!(a.allocate_dynamic("i0").unwrap(), ip("10.0.0.1"));
                assert_eq!(a.allocate_dynamic("i1").unwrap(), ip("10.0.0.2"));
                assert_eq!(a.allocate_dynamic("i2").unwrap(), ip("10.0.0.3"));
            }

            #[test]
            fn allocation_fills_first_gap() {
                let mut a = make(range("10.0.0.10", "10.0.0.20"), &[]);
                for (owner, addr) in [("a", "10.0.0.10"), ("b", "10.0.0.11"), ("c", "10.0.0.13")] {
                    a.reserve(ip(addr), owner, None).unwrap();
                }
                assert_eq!(a.allocate_dynamic("d").unwrap(), ip("10.0.0.12"));
                assert_eq!(a.allocate_dynamic("e").unwrap(), ip("10.0.0.14"));
            }

            #[test]
            fn allocation_skips_static_pool() {
                let mut a = make(range("10.0.0.10", "10.0.0.13"), &[entry("10.0.0.10 - 10.0.0.11")]);
                assert_eq!(a.allocate_dynamic("a").unwrap(), ip("10.0.0.12"));
            }

            #[test]
            fn release_then_allocate_round_trips() {
                let mut a = subnet();
                let first = a.allocate_dynamic("a").unwrap();
                a.release(first).unwrap();
                assert_eq!(a.allocate_dynamic("b").unwrap(), first);
            }

            #[test]
            fn exhausted_range_has_no_capacity() {
                let r = range("10.0.0.10", "10.0.0.12");
                let mut a = make(r, &[]);
                for owner in ["a", "b", "c"] {
                    let got = a.allocate_dynamic(owner).unwrap();
                    assert!(r.contains(got));
                }
                let err = a.allocate_dynamic("d").unwrap_err();
                assert!(matches!(err, IpamError::NoCapacity { ref network } if network == "private"));
            }

            #[test]
            fn reserve_pool_address_is_static() {
                let mut a = subnet();
                assert_eq!(a.reserve(ip("10.0.0.205"), "a", None).unwrap(), AddressKind::Static);
                assert_eq!(
                    a.reserve(ip("10.0.0.206"), "b", Some(AddressKind::Static)).unwrap(),
                    AddressKind::Static
                );
            }

            #[test]
            fn reserve_other_address_is_dynamic() {
                let mut a = subnet();
                assert_eq!(a.reserve(ip("10.0.0.50"), "a", None).unwrap(), AddressKind::Dynamic);
            }

            #[test]
            fn reserve_requested_kind_must_match() {
                let mut a = subnet();
                assert!(matches!(
                    a.reserve(ip("10.0.0.50"), "a", Some(AddressKind::Static)),
                    Err(IpamError::WrongType { .. })
                ));
                assert!(matches!(
                    a.reserve(ip("10.0.0.201"), "a", Some(AddressKind::Dynamic)),
                    Err(IpamError::WrongType { .. })
                ));
            }

            #[test]
            fn reserve_out_of_range() {
                let mut a = subnet();
                let err = a.reserve(ip("10.0.1.5"), "a", None).unwrap_err();
                assert!(matches!(err, IpamError::OutOfRange { .. }));
                assert!(err.to_string().contains("10.0.1.5"));
            }

            #[test]
            fn reserve_held_address_by_other_owner_fails() {
                let mut a = subnet();
                a.reserve(ip("10.0.0.50"), "a", None).unwrap();
                let err = a.reserve(ip("10.0.0.50"), "b", None).unwrap_err();
                assert!(matches!(err, IpamError::AlreadyOwned { ref owner, .. } if owner == "a"));
            }

            #[test]
            fn reserve_is_idempotent_for_same_owner() {
                let mut a = subnet();
                let got = a.allocate_dynamic("a").unwrap();
                assert_eq!(a.reserve(got, "a", None).unwrap(), AddressKind::Dynamic);
                assert_eq!(a.reserve(got, "a", Some(AddressKind::Dynamic)).unwrap(), AddressKind::Dynamic);
            }

            #[test]
            fn reserve_blacklisted_address_fails() {
                let mut a = subnet();
                assert!(matches!(
                    a.reserve(ip("10.0.0.0"), "a", None),
                    Err(IpamError::IpReserved { .. })
                ));
            }

            #[test]
            fn release_requires_ownership() {
                let mut a = subnet();
                assert!(matches!(a.release(ip("10.0.0.9")), Err(IpamError::NotOwned { .. })));
                assert!(matches!(a.release(ip("10.0.0.0")), Err(IpamError::NotOwned { .. })));
            }

            #[test]
            fn blacklist_outside_range_fails() {
                let mut a = subnet();
                assert!(matches!(
                    a.blacklist(ip("192.168.0.1")),
                    Err(IpamError::ReservedIpOutOfRange { .. })
                ));
            }

            #[test]
            fn blacklisted_address_is_never_allocated() {
                let r = range("10.0.0.10", "10.0.0.12");
                let mut a = make(r, &[]);
                a.blacklist(ip("10.0.0.11")).unwrap();
                assert_eq!(a.allocate_dynamic("a").unwrap(), ip("10.0.0.10"));
                assert_eq!(a.allocate_dynamic("b").unwrap(), ip("10.0.0.12"));
            }

            #[test]
            fn available_sets_shrink() {
                let mut a = make(range("10.0.0.10", "10.0.0.19"), &[entry("10.0.0.18 - 10.0.0.19")]);
                assert_eq!(a.available_static().unwrap(), 2);
                assert_eq!(a.available_dynamic().unwrap(), 8);

                a.reserve(ip("10.0.0.19"), "a", None).unwrap();
                a.allocate_dynamic("b").unwrap();
                assert_eq!(a.available_static().unwrap(), 1);
                assert_eq!(a.available_dynamic().unwrap(), 7);

                a.blacklist_range(entry("10.0.0.15 - 10.0.0.17")).unwrap();
                assert_eq!(a.available_dynamic().unwrap(), 4);
            }

            #[test]
            fn blacklisting_a_held_address_keeps_its_owner() {
                let mut a = subnet();
                a.reserve(ip("10.0.0.50"), "a", None).unwrap();
                a.blacklist_range(entry("10.0.0.50 - 10.0.0.51")).unwrap();

                assert_eq!(a.reserve(ip("10.0.0.50"), "a", None).unwrap(), AddressKind::Dynamic);
                assert!(matches!(
                    a.reserve(ip("10.0.0.50"), "b", None),
                    Err(IpamError::AlreadyOwned { ref owner, .. }) if owner == "a"
                ));
                assert!(matches!(
                    a.reserve(ip("10.0.0.51"), "b", None),
                    Err(IpamError::IpReserved { .. })
                ));

                a.release(ip("10.0.0.50")).unwrap();
                assert!(matches!(
                    a.reserve(ip("10.0.0.50"), "b", None),
                    Err(IpamError::IpReserved { .. })
                ));
            }

            #[test]
            fn reserved_range_outside_subnet_fails() {
                let mut a = subnet();
                assert!(matches!(
                    a.blacklist_range(entry("10.0.0.250 - 10.0.1.4")),
                    Err(IpamError::ReservedIpOutOfRange { ref ip, .. }) if *ip == super::ip("10.0.1.4")
                ));
            }

            #[test]
            fn wide_ipv6_reserved_range_is_skipped_whole() {
                let r = cidr("fd00:1::/64");
                let mut a = make(r, &[entry("fd00:1::ffff:ffff:fff1 - fd00:1::ffff:ffff:fff8")]);
                a.blacklist_range(entry("fd00:1::1 - fd00:1::ffff:ffff:fff0")).unwrap();
                a.blacklist(r.first()).unwrap();

                assert_eq!(a.allocate_dynamic("a").unwrap(), ip("fd00:1::ffff:ffff:fff9"));
                assert_eq!(a.available_static().unwrap(), 8);
                assert_eq!(a.available_dynamic().unwrap(), (1u128 << 64) - 0xffff_ffff_fff9 - 1);
                assert!(matches!(
                    a.reserve(ip("fd00:1::abcd"), "b", None),
                    Err(IpamError::IpReserved { .. })
                ));
            }

            #[test]
            fn ipv6_allocation() {
                let r = cidr("fd00:10::/120");
                let mut a = make(r, &[]);
                a.blacklist(r.first()).unwrap();
                assert_eq!(a.allocate_dynamic("a").unwrap(), ip("fd00:10::1"));
                assert_eq!(a.allocate_dynamic("b").unwrap(), ip("fd00:10::2"));
                a.reserve(ip("fd00:10::4"), "c", None).unwrap();
                assert_eq!(a.allocate_dynamic("d").unwrap(), ip("fd00:10::3"));
                assert_eq!(a.allocate_dynamic("e").unwrap(), ip("fd00:10::5"));
            }
        }
    };
}

allocator_behaviour!(
    memory,
    InMemoryAllocator,
    |range, statics: &[AddressRange]| InMemoryAllocator::in_memory("private", range, statics)
        .unwrap()
);

allocator_behaviour!(
    store,
    StoreAllocator,
    |range, statics: &[AddressRange]| {
        let store = StateStore::open_in_memory().unwrap();
        StoreAllocator::with_store("private", range, statics, store).unwrap()
    }
);

#[test]
fn store_allocators_share_rows_across_handles() {
    let store = StateStore::open_in_memory().unwrap();
    let r = cidr("10.0.0.0/24");
    let mut a = StoreAllocator::with_store("private", r, &[], store.clone()).unwrap();
    let mut b = StoreAllocator::with_store("private", r, &[], store.clone()).unwrap();
    a.blacklist(r.first()).unwrap();
    b.blacklist(r.first()).unwrap();

    assert_eq!(a.allocate_dynamic("a").unwrap(), ip("10.0.0.1"));
    assert_eq!(b.allocate_dynamic("b").unwrap(), ip("10.0.0.2"));
    assert!(matches!(
        b.reserve(ip("10.0.0.1"), "b", None),
        Err(IpamError::AlreadyOwned { .. })
    ));

    let row = store.get_ip("private", ip("10.0.0.2")).unwrap().unwrap();
    assert_eq!(row.owner.as_deref(), Some("b"));
}

#[test]
fn store_reservations_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ipam.redb");
    let r = cidr("10.0.0.0/24");

    {
        let store = StateStore::open(&path).unwrap();
        let mut a = StoreAllocator::with_store("private", r, &[], store).unwrap();
        a.blacklist(r.first()).unwrap();
        assert_eq!(a.allocate_dynamic("a").unwrap(), ip("10.0.0.1"));
        a.reserve(ip("10.0.0.3"), "b", None).unwrap();
    }

    let store = StateStore::open(&path).unwrap();
    let mut a = StoreAllocator::with_store("private", r, &[], store.clone()).unwrap();
    a.blacklist(r.first()).unwrap();
    assert_eq!(a.allocate_dynamic("c").unwrap(), ip("10.0.0.2"));
    assert_eq!(a.allocate_dynamic("d").unwrap(), ip("10.0.0.4"));
}

#[test]
fn blacklisting_writes_no_rows() {
    let store = StateStore::open_in_memory().unwrap();
    let r = cidr("fd00:1::/64");
    let mut a = StoreAllocator::with_store("private", r, &[], store.clone()).unwrap();
    a.blacklist_range(entry("fd00:1:: - fd00:1::ffff:ffff:ffff")).unwrap();

    assert!(store.list_ips_for_network("private").unwrap().is_empty());
    assert_eq!(a.allocate_dynamic("a").unwrap(), ip("fd00:1::1:0:0:0"));
}
