use std::net::{Ipv4Addr, Ipv6Addr};

use lanlink_proto::discovery::{is_hostname, LookupError, SrvTarget};
use lanlink_proto::{DiscoveryResolver, RecordLookup};

use crate::init_tracing;

/// Directory fixture for a small published zone.
struct Zone;

impl RecordLookup for Zone {
    fn srv(&self, name: &str) -> Result<Option<SrvTarget>, LookupError> {
        Ok(match name {
            "play.example.com" => Some(SrvTarget {
                target: "node7.example.com".into(),
                port: 7788,
            }),
            _ => None,
        })
    }

    fn txt(&self, name: &str) -> Result<Option<String>, LookupError> {
        Ok(match name {
            "txt-only.example.com" => Some("LANLINK_203.0.113.9:7780".into()),
            _ => None,
        })
    }

    fn aaaa(&self, name: &str) -> Result<Option<Ipv6Addr>, LookupError> {
        Ok(match name {
            "node7.example.com" => Some("2001:db8::7".parse().unwrap()),
            "v6-only.example.com" => Some("2001:db8::c0ff:ee".parse().unwrap()),
            _ => None,
        })
    }

    fn a(&self, name: &str) -> Result<Option<Ipv4Addr>, LookupError> {
        Ok(match name {
            "node7.example.com" => Some(Ipv4Addr::new(198, 51, 100, 7)),
            "plain.example.com" => Some(Ipv4Addr::new(198, 51, 100, 20)),
            _ => None,
        })
    }
}

/// Resolve the documented ways a host can publish a session: service
/// record, text record, bare address records.
#[test]
fn published_zone_resolves_through_the_record_chain() {
    init_tracing();
    let resolver = DiscoveryResolver::new(Zone);

    // SRV wins and carries its own port; v4 preferred here.
    let hit = resolver.resolve("play.example.com", false);
    assert_eq!(hit.address, "198.51.100.7");
    assert_eq!(hit.port, Some(7788));

    // Same name, v6 preference flips the target family.
    let hit = resolver.resolve("play.example.com", true);
    assert_eq!(hit.address, "2001:db8::7");

    // TXT-published session.
    let hit = resolver.resolve("txt-only.example.com", false);
    assert_eq!(hit.address, "203.0.113.9");
    assert_eq!(hit.port, Some(7780));

    // Plain address records resolve without a port.
    let hit = resolver.resolve("plain.example.com", false);
    assert_eq!(hit.address, "198.51.100.20");
    assert_eq!(hit.port, None);

    let hit = resolver.resolve("v6-only.example.com", false);
    assert_eq!(hit.address, "2001:db8::c0ff:ee");

    // Unpublished name: chain exhausted.
    assert!(!resolver.resolve("nowhere.example.com", false).resolved);
}

/// The hostname gate keeps raw addresses away from the resolver.
#[test]
fn hostname_gate_filters_connect_inputs() {
    assert!(is_hostname("play.example.com"));
    assert!(is_hostname("localhost"));
    assert!(!is_hostname("198.51.100.7"));
    assert!(!is_hostname("2001:db8::7"));
    assert!(!is_hostname("not a hostname"));
}
