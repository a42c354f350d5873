//! LanLink integration test harness.
//!
//! Whole sessions run in-process over the loopback hub: one authority
//! task plus any number of peer tasks, each with its own telemetry
//! sink. Timers run on tokio's paused clock, so multi-second protocol
//! flows (broadcast timeouts, probe fallback) finish instantly.

mod discovery;
mod label_sync;
mod latency;

use std::sync::Arc;
use std::time::Duration;

use lanlink_core::config::LanLinkConfig;
use lanlink_proto::channel::{LoopbackChannel, LoopbackHub, MemorySink};
use lanlink_proto::runtime::{spawn_authority, spawn_peer, AuthorityHandle, PeerHandle};
use lanlink_proto::{PeerId, SessionEvents, AUTHORITY};

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lanlink_proto=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub struct Session {
    pub hub: Arc<LoopbackHub>,
    pub sink: Arc<MemorySink>,
    pub authority: AuthorityHandle<LoopbackChannel, MemorySink>,
}

/// Bring up an authority over a fresh hub.
pub fn start_session(config: &LanLinkConfig) -> Session {
    init_tracing();
    let hub = LoopbackHub::new();
    let (channel, inbound) = hub.attach(AUTHORITY);
    let sink = MemorySink::new();
    let authority = spawn_authority(Arc::new(channel), sink.clone(), config, inbound);
    Session { hub, sink, authority }
}

impl Session {
    /// Register `id` with the authority and attach a peer task for it.
    /// Returns the peer handle and its private sink.
    pub fn join_peer(
        &self,
        id: PeerId,
        label: &str,
        config: &LanLinkConfig,
    ) -> (PeerHandle, Arc<MemorySink>) {
        self.authority.on_peer_joined(id);
        let (channel, inbound) = self.hub.attach(id);
        let sink = MemorySink::new();
        let peer = spawn_peer(Arc::new(channel), sink.clone(), config, inbound, label);
        (peer, sink)
    }
}

/// Poll `check` until it passes or the (paused-clock) deadline expires.
pub async fn eventually(deadline: Duration, mut check: impl FnMut() -> bool) {
    tokio::time::timeout(deadline, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("condition not reached before deadline");
}
