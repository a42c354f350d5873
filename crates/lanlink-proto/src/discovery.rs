//! Hostname discovery — prioritized directory-record resolution.
//!
//! Turns a human-supplied hostname into an address and optional port by
//! walking a fixed chain of record types: service record, text record
//! (custom payload), IPv6 address record, IPv4 address record. The
//! first hit wins. This layer never performs lookups itself; the host
//! supplies a [`RecordLookup`] and we order and interpret its answers.
//!
//! A lookup error at any step is logged and treated as "no answer" for
//! that step only — resolution always walks the rest of the chain.

use std::net::{Ipv4Addr, Ipv6Addr};

use once_cell::sync::Lazy;
use regex::Regex;

use lanlink_core::wire::PRODUCT_TAG;

/// Multi-label dotted hostname form. Single labels (other than the
/// special-cased "localhost") are not accepted.
static HOSTNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((([a-z0-9])|([a-z0-9][-_][a-z]))+\.)+(([a-z0-9])|([a-z0-9][-_][a-z0-9]))+$")
        .expect("hostname pattern is valid")
});

// ── Types ─────────────────────────────────────────────────────────────────────

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    pub address: String,
    pub port: Option<u16>,
    pub resolved: bool,
}

impl DiscoveryResult {
    fn with_port(address: String, port: u16) -> Self {
        Self {
            address,
            port: Some(port),
            resolved: true,
        }
    }

    fn address_only(address: String) -> Self {
        Self {
            address,
            port: None,
            resolved: true,
        }
    }

    pub fn unresolved() -> Self {
        Self {
            address: String::new(),
            port: None,
            resolved: false,
        }
    }
}

/// A service-record answer: a target host to resolve further, plus the
/// advertised port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub target: String,
    pub port: u16,
}

/// A single failed directory query. Carries the underlying message
/// only; which step failed is recorded by the resolver's logging.
#[derive(Debug, thiserror::Error)]
#[error("record lookup failed: {0}")]
pub struct LookupError(pub String);

/// Directory queries the host's resolver must answer. `Ok(None)` means
/// the record does not exist; `Err` means the query itself failed.
pub trait RecordLookup: Send + Sync {
    fn srv(&self, name: &str) -> Result<Option<SrvTarget>, LookupError>;
    fn txt(&self, name: &str) -> Result<Option<String>, LookupError>;
    fn aaaa(&self, name: &str) -> Result<Option<Ipv6Addr>, LookupError>;
    fn a(&self, name: &str) -> Result<Option<Ipv4Addr>, LookupError>;
}

// ── Resolver ──────────────────────────────────────────────────────────────────

pub struct DiscoveryResolver<L> {
    lookup: L,
}

impl<L: RecordLookup> DiscoveryResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// Walk the record chain for `hostname`. Each step runs only if the
    /// previous one produced nothing.
    pub fn resolve(&self, hostname: &str, prefer_ipv6: bool) -> DiscoveryResult {
        if let Some(result) = self.resolve_srv(hostname, prefer_ipv6) {
            return result;
        }
        if let Some(result) = self.resolve_txt(hostname) {
            return result;
        }
        if let Some(addr) = answer("AAAA", self.lookup.aaaa(hostname)) {
            tracing::info!(hostname, address = %addr, "resolved via AAAA record");
            return DiscoveryResult::address_only(addr.to_string());
        }
        if let Some(addr) = answer("A", self.lookup.a(hostname)) {
            tracing::info!(hostname, address = %addr, "resolved via A record");
            return DiscoveryResult::address_only(addr.to_string());
        }

        tracing::warn!(hostname, "no directory record produced an address");
        DiscoveryResult::unresolved()
    }

    fn resolve_srv(&self, hostname: &str, prefer_ipv6: bool) -> Option<DiscoveryResult> {
        let srv = answer("SRV", self.lookup.srv(hostname))?;

        // Resolve the SRV target in the preferred family first, then
        // fall back to the other one.
        let address = if prefer_ipv6 {
            match answer("AAAA", self.lookup.aaaa(&srv.target)) {
                Some(v6) => {
                    tracing::info!(target = %srv.target, "service target resolved via AAAA");
                    Some(v6.to_string())
                }
                None => answer("A", self.lookup.a(&srv.target)).map(|v4| {
                    tracing::info!(target = %srv.target, "service target fell back to A");
                    v4.to_string()
                }),
            }
        } else {
            match answer("A", self.lookup.a(&srv.target)) {
                Some(v4) => {
                    tracing::info!(target = %srv.target, "service target resolved via A");
                    Some(v4.to_string())
                }
                None => answer("AAAA", self.lookup.aaaa(&srv.target)).map(|v6| {
                    tracing::info!(target = %srv.target, "service target fell back to AAAA");
                    v6.to_string()
                }),
            }
        };

        let address = address?;
        tracing::info!(hostname, %address, port = srv.port, "resolved via SRV record");
        Some(DiscoveryResult::with_port(address, srv.port))
    }

    fn resolve_txt(&self, hostname: &str) -> Option<DiscoveryResult> {
        let payload = answer("TXT", self.lookup.txt(hostname))?;
        match parse_txt_payload(&payload) {
            Some((address, port)) => {
                tracing::info!(hostname, %address, port, "resolved via TXT record");
                Some(DiscoveryResult::with_port(address, port))
            }
            None => {
                // Unparseable TXT data falls through to the next step.
                tracing::debug!(hostname, payload, "TXT record present but not ours");
                None
            }
        }
    }
}

/// Collapse a query result to an optional answer, logging failures.
fn answer<T>(record: &str, result: Result<Option<T>, LookupError>) -> Option<T> {
    match result {
        Ok(found) => found,
        Err(e) => {
            tracing::error!(record, error = %e, "lookup failed, treating as no answer");
            None
        }
    }
}

/// Parse a `LANLINK_<address>:<port>` TXT payload. The split is on the
/// last colon so bracketless IPv6 addresses survive.
pub(crate) fn parse_txt_payload(text: &str) -> Option<(String, u16)> {
    let rest = text.strip_prefix(PRODUCT_TAG)?.strip_prefix('_')?;
    let (address, port) = rest.rsplit_once(':')?;
    if address.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    Some((address.to_string(), port))
}

// ── Address classification ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    V4,
    V6,
    NotAnAddress,
}

pub fn is_ipv4(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

pub fn is_ipv6(s: &str) -> bool {
    s.parse::<Ipv6Addr>().is_ok()
}

pub fn address_kind(s: &str) -> AddressKind {
    if is_ipv4(s) {
        AddressKind::V4
    } else if is_ipv6(s) {
        AddressKind::V6
    } else {
        AddressKind::NotAnAddress
    }
}

/// Should resolution be attempted for this input at all?
/// "localhost" passes unconditionally; IP literals are never hostnames;
/// everything else must be a multi-label dotted name.
pub fn is_hostname(s: &str) -> bool {
    if s == "localhost" {
        return true;
    }
    if address_kind(s) != AddressKind::NotAnAddress {
        return false;
    }
    HOSTNAME_RE.is_match(s)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted lookup that records which steps were attempted.
    #[derive(Default)]
    struct ScriptedLookup {
        srv: Option<SrvTarget>,
        txt: Option<String>,
        aaaa: Option<Ipv6Addr>,
        a: Option<Ipv4Addr>,
        srv_fails: bool,
        queried: Mutex<Vec<String>>,
    }

    impl ScriptedLookup {
        fn log(&self, what: &str) {
            self.queried.lock().unwrap().push(what.to_string());
        }

        fn queries(&self) -> Vec<String> {
            self.queried.lock().unwrap().clone()
        }
    }

    impl RecordLookup for ScriptedLookup {
        fn srv(&self, _name: &str) -> Result<Option<SrvTarget>, LookupError> {
            self.log("srv");
            if self.srv_fails {
                return Err(LookupError("connection refused".into()));
            }
            Ok(self.srv.clone())
        }

        fn txt(&self, _name: &str) -> Result<Option<String>, LookupError> {
            self.log("txt");
            Ok(self.txt.clone())
        }

        fn aaaa(&self, _name: &str) -> Result<Option<Ipv6Addr>, LookupError> {
            self.log("aaaa");
            Ok(self.aaaa)
        }

        fn a(&self, _name: &str) -> Result<Option<Ipv4Addr>, LookupError> {
            self.log("a");
            Ok(self.a)
        }
    }

    #[test]
    fn srv_hit_resolves_target_and_uses_srv_port() {
        let lookup = ScriptedLookup {
            srv: Some(SrvTarget {
                target: "game.example.com".into(),
                port: 7788,
            }),
            a: Some(Ipv4Addr::new(192, 0, 2, 10)),
            ..Default::default()
        };
        let resolver = DiscoveryResolver::new(lookup);

        let result = resolver.resolve("play.example.com", false);
        assert_eq!(
            result,
            DiscoveryResult {
                address: "192.0.2.10".into(),
                port: Some(7788),
                resolved: true,
            }
        );
    }

    #[test]
    fn srv_target_prefers_ipv6_when_asked() {
        let lookup = ScriptedLookup {
            srv: Some(SrvTarget {
                target: "game.example.com".into(),
                port: 7788,
            }),
            aaaa: Some("2001:db8::7".parse().unwrap()),
            a: Some(Ipv4Addr::new(192, 0, 2, 10)),
            ..Default::default()
        };
        let resolver = DiscoveryResolver::new(lookup);

        let result = resolver.resolve("play.example.com", true);
        assert_eq!(result.address, "2001:db8::7");
    }

    #[test]
    fn srv_target_falls_back_to_other_family() {
        let lookup = ScriptedLookup {
            srv: Some(SrvTarget {
                target: "game.example.com".into(),
                port: 7788,
            }),
            // prefer_ipv6 but only an A record exists for the target.
            a: Some(Ipv4Addr::new(192, 0, 2, 11)),
            ..Default::default()
        };
        let resolver = DiscoveryResolver::new(lookup);

        let result = resolver.resolve("play.example.com", true);
        assert_eq!(result.address, "192.0.2.11");
        assert_eq!(result.port, Some(7788));
    }

    #[test]
    fn txt_payload_with_product_tag_resolves() {
        let lookup = ScriptedLookup {
            txt: Some("LANLINK_192.0.2.20:7777".into()),
            ..Default::default()
        };
        let resolver = DiscoveryResolver::new(lookup);

        let result = resolver.resolve("play.example.com", false);
        assert_eq!(result.address, "192.0.2.20");
        assert_eq!(result.port, Some(7777));
    }

    #[test]
    fn a_record_wins_only_after_earlier_steps_yield_nothing() {
        let lookup = ScriptedLookup {
            a: Some(Ipv4Addr::new(192, 0, 2, 30)),
            ..Default::default()
        };
        let resolver = DiscoveryResolver::new(lookup);

        let result = resolver.resolve("play.example.com", false);
        assert_eq!(result.address, "192.0.2.30");
        assert_eq!(result.port, None);

        // SRV, TXT and AAAA were all attempted first, in order.
        assert_eq!(resolver.lookup.queries(), vec!["srv", "txt", "aaaa", "a"]);
    }

    #[test]
    fn foreign_txt_payload_falls_through() {
        let lookup = ScriptedLookup {
            txt: Some("v=spf1 -all".into()),
            aaaa: Some("2001:db8::1".parse().unwrap()),
            ..Default::default()
        };
        let resolver = DiscoveryResolver::new(lookup);

        let result = resolver.resolve("play.example.com", false);
        assert_eq!(result.address, "2001:db8::1");
        assert_eq!(result.port, None);
    }

    #[test]
    fn lookup_error_is_not_fatal_for_the_chain() {
        let lookup = ScriptedLookup {
            srv_fails: true,
            a: Some(Ipv4Addr::new(192, 0, 2, 40)),
            ..Default::default()
        };
        let resolver = DiscoveryResolver::new(lookup);

        let result = resolver.resolve("play.example.com", false);
        assert!(result.resolved);
        assert_eq!(result.address, "192.0.2.40");
    }

    #[test]
    fn exhausted_chain_is_unresolved() {
        let resolver = DiscoveryResolver::new(ScriptedLookup::default());
        let result = resolver.resolve("play.example.com", false);
        assert!(!result.resolved);
    }

    #[test]
    fn txt_payload_parsing() {
        assert_eq!(
            parse_txt_payload("LANLINK_host.example.com:7777"),
            Some(("host.example.com".into(), 7777))
        );
        // Bracketless IPv6: split on the last colon.
        assert_eq!(
            parse_txt_payload("LANLINK_2001:db8::5:7777"),
            Some(("2001:db8::5".into(), 7777))
        );
        assert_eq!(parse_txt_payload("LANLINK_:7777"), None);
        assert_eq!(parse_txt_payload("LANLINK_nocolon"), None);
        assert_eq!(parse_txt_payload("LANLINK_host:99999"), None);
        assert_eq!(parse_txt_payload("OTHER_host:7777"), None);
        assert_eq!(parse_txt_payload(""), None);
    }

    #[test]
    fn hostname_validation() {
        assert!(is_hostname("localhost"));
        assert!(is_hostname("play.example.com"));
        assert!(is_hostname("a.b"));
        // Single labels are not hostnames.
        assert!(!is_hostname("example"));
        // IP literals are addresses, not hostnames.
        assert!(!is_hostname("192.0.2.1"));
        assert!(!is_hostname("2001:db8::1"));
        assert!(!is_hostname(""));
    }

    #[test]
    fn address_kind_classifies() {
        assert_eq!(address_kind("192.0.2.1"), AddressKind::V4);
        assert_eq!(address_kind("2001:db8::1"), AddressKind::V6);
        assert_eq!(address_kind("play.example.com"), AddressKind::NotAnAddress);
    }
}
