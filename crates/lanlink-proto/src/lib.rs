//! lanlink-proto — the telemetry-and-discovery layer of a LanLink session.
//!
//! Three independent pieces ride on one host-provided message channel:
//! hostname discovery ([`discovery`]), display-label synchronization
//! ([`sync`]), and round-trip latency measurement ([`latency`]).
//! [`runtime`] wires them into cooperative tokio tasks per role.

pub mod channel;
pub mod discovery;
pub mod latency;
pub mod roster;
pub mod runtime;
pub mod sync;

pub use channel::{Delivery, Inbound, MessageChannel, PeerId, SessionEvents, TelemetrySink, Topic, AUTHORITY};
pub use discovery::{DiscoveryResolver, DiscoveryResult, RecordLookup, SrvTarget};
pub use latency::{EchoResponder, LatencyProbe, Measurement, ProbeMode};
pub use roster::{PeerRecord, Roster};
pub use runtime::{spawn_authority, spawn_peer, AuthorityHandle, PeerHandle};
pub use sync::{Broadcaster, Follower, SyncOutcome};
