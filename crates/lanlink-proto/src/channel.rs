//! Seams between the protocol layer and its host session.
//!
//! The host owns the real transport, the display surface, and peer
//! lifecycle dispatch. This module defines the three capability traits
//! the protocol layer works against, plus a loopback channel used by
//! local sessions and the test harness.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Opaque endpoint id on the message channel.
pub type PeerId = u64;

/// Endpoint id 0 always denotes the authority.
pub const AUTHORITY: PeerId = 0;

/// Delivery class requested from the transport. Label sync rides on
/// reliable delivery; latency probes are deliberately unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Reliable,
    Unreliable,
}

/// Named message kinds multiplexed over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    LabelChanged,
    GlobalRefresh,
    RefreshAck,
    LatencyProbe,
    LatencyEcho,
}

/// An incoming message as handed to a role's inbox.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub from: PeerId,
    pub topic: Topic,
    pub payload: Bytes,
}

// ── Capability traits ─────────────────────────────────────────────────────────

/// Raw message channel the host exposes. Sends are fire-and-forget;
/// loss is the protocol layer's problem, not the channel's.
pub trait MessageChannel: Send + Sync {
    fn send_to(&self, peer: PeerId, topic: Topic, payload: Bytes, delivery: Delivery);

    fn send_to_all(&self, topic: Topic, payload: Bytes, delivery: Delivery);

    /// Transport-measured round-trip time towards a peer, if the
    /// transport keeps one. The latency fallback reads this.
    fn transport_rtt_ms(&self, peer: PeerId) -> Option<u64>;
}

/// Outputs the protocol layer produces for the host to render.
pub trait TelemetrySink: Send + Sync {
    /// Periodic latency value, in milliseconds.
    fn latency_sample(&self, ms: u64);

    /// User-visible warning. Callers rate-limit; every call here is
    /// meant to reach the operator.
    fn warning(&self, message: &str);
}

/// Peer lifecycle events the host fires into this layer.
pub trait SessionEvents: Send + Sync {
    fn on_peer_joined(&self, peer: PeerId);
    fn on_peer_left(&self, peer: PeerId);
}

// ── Loopback channel ──────────────────────────────────────────────────────────

/// Connects endpoints within one process. Each endpoint gets an inbox
/// receiver; sends to a missing endpoint are dropped, matching the
/// unreliable-network contract.
#[derive(Debug, Default)]
pub struct LoopbackHub {
    endpoints: DashMap<PeerId, mpsc::UnboundedSender<Inbound>>,
    rtt_ms: DashMap<PeerId, u64>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an endpoint, returning its channel handle and inbox.
    pub fn attach(
        self: &Arc<Self>,
        peer: PeerId,
    ) -> (LoopbackChannel, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints.insert(peer, tx);
        (
            LoopbackChannel {
                hub: self.clone(),
                local: peer,
            },
            rx,
        )
    }

    pub fn detach(&self, peer: PeerId) {
        self.endpoints.remove(&peer);
    }

    /// Seed the transport-level RTT metric for a peer.
    pub fn set_transport_rtt(&self, peer: PeerId, ms: u64) {
        self.rtt_ms.insert(peer, ms);
    }
}

/// One endpoint's handle onto a [`LoopbackHub`].
#[derive(Clone)]
pub struct LoopbackChannel {
    hub: Arc<LoopbackHub>,
    local: PeerId,
}

impl LoopbackChannel {
    pub fn local_id(&self) -> PeerId {
        self.local
    }

    fn deliver(&self, peer: PeerId, topic: Topic, payload: Bytes) {
        let Some(tx) = self.hub.endpoints.get(&peer) else {
            tracing::debug!(peer, ?topic, "no such endpoint, message dropped");
            return;
        };
        if tx.send(Inbound { from: self.local, topic, payload }).is_err() {
            tracing::debug!(peer, ?topic, "endpoint inbox closed, message dropped");
        }
    }
}

impl MessageChannel for LoopbackChannel {
    fn send_to(&self, peer: PeerId, topic: Topic, payload: Bytes, _delivery: Delivery) {
        self.deliver(peer, topic, payload);
    }

    fn send_to_all(&self, topic: Topic, payload: Bytes, _delivery: Delivery) {
        let targets: Vec<PeerId> = self
            .hub
            .endpoints
            .iter()
            .map(|e| *e.key())
            .filter(|p| *p != self.local)
            .collect();
        for peer in targets {
            self.deliver(peer, topic, payload.clone());
        }
    }

    fn transport_rtt_ms(&self, peer: PeerId) -> Option<u64> {
        self.hub.rtt_ms.get(&peer).map(|v| *v)
    }
}

// ── Memory sink ───────────────────────────────────────────────────────────────

/// A [`TelemetrySink`] that records everything it is handed. Used by
/// tests and by hosts that poll instead of push.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Mutex<Vec<u64>>,
    warnings: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn samples(&self) -> Vec<u64> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_sample(&self) -> Option<u64> {
        self.samples().last().copied()
    }
}

impl TelemetrySink for MemorySink {
    fn latency_sample(&self, ms: u64) {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).push(ms);
    }

    fn warning(&self, message: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}
