//! Label state sync — authority broadcast with per-peer acknowledgement.
//!
//! The authority packs every roster slot's label into one refresh frame,
//! sends it to all peers, and tracks acks per session. A periodic tick
//! re-sends to at most one straggler at a time until either every peer
//! has acked or a 30-second ceiling is hit. Sessions are correlated by a
//! random nonzero broadcast id; acks carrying any other id are stale and
//! dropped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::time::Instant;

use lanlink_core::wire::{
    decode_ack, decode_label_changed, decode_refresh, encode_ack, encode_label_changed,
    encode_refresh, WireError,
};

use crate::channel::{Delivery, MessageChannel, PeerId, Topic};
use crate::roster::Roster;

/// Hard ceiling on one broadcast session, measured from start.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Broadcast id meaning "no previous session". Fresh ids are never 0.
pub const ID_SENTINEL: u8 = 0;

/// Straggler re-send cadence: a tenth of the session ceiling, floored
/// at one second.
pub fn resend_interval() -> Duration {
    Duration::from_secs((SYNC_TIMEOUT.as_secs() / 10).max(1))
}

// ── Session state ─────────────────────────────────────────────────────────────

/// How a broadcast session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    AllAcked,
    TimedOut { pending: Vec<PeerId> },
}

struct Session {
    broadcast_id: u8,
    generation: u64,
    pending: Vec<PeerId>,
    acked: HashSet<PeerId>,
    started_at: Instant,
    deadline: Instant,
    resends: u32,
    frame: Bytes,
}

impl Session {
    fn next_check(&self) -> Instant {
        // Recomputed from the start time each round so repeated ticks
        // never accumulate drift.
        self.started_at + resend_interval() * (self.resends + 1)
    }
}

#[derive(Default)]
struct BroadcastState {
    last_id: u8,
    generation: u64,
    session: Option<Session>,
}

// ── Authority side ────────────────────────────────────────────────────────────

/// Authority-owned broadcaster. At most one session runs at a time; the
/// guard is a compare-exchange so two overlapping start requests can
/// never both win.
pub struct Broadcaster<C> {
    channel: Arc<C>,
    busy: AtomicBool,
    state: Mutex<BroadcastState>,
}

impl<C: MessageChannel> Broadcaster<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            busy: AtomicBool::new(false),
            state: Mutex::new(BroadcastState::default()),
        }
    }

    /// Start a new session from the roster's current slots. Returns
    /// `Ok(false)` without side effects if a session is already in
    /// flight.
    pub fn start_broadcast(&self, roster: &Roster, now: Instant) -> Result<bool, WireError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("label broadcast already in flight, ignoring start request");
            return Ok(false);
        }

        let labels = roster.labels();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let broadcast_id = fresh_id(state.last_id);
        let frame = match encode_refresh(broadcast_id, &labels) {
            Ok(frame) => frame,
            Err(e) => {
                self.busy.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let pending: Vec<PeerId> = roster
            .controlled()
            .map(|r| r.id)
            .filter(|id| *id != crate::channel::AUTHORITY)
            .collect();

        state.last_id = broadcast_id;
        state.generation += 1;
        tracing::info!(
            broadcast_id,
            generation = state.generation,
            peers = pending.len(),
            "starting label broadcast"
        );

        state.session = Some(Session {
            broadcast_id,
            generation: state.generation,
            pending,
            acked: HashSet::new(),
            started_at: now,
            deadline: now + SYNC_TIMEOUT,
            resends: 0,
            frame: frame.clone(),
        });
        drop(state);

        self.channel
            .send_to_all(Topic::GlobalRefresh, frame, Delivery::Reliable);
        Ok(true)
    }

    /// Handle an ack frame from `peer`. Stale or duplicate acks are
    /// dropped quietly; acks from peers the session never targeted are
    /// dropped with a warning.
    pub fn on_ack(&self, peer: PeerId, payload: &[u8]) {
        let broadcast_id = match decode_ack(payload) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(peer, error = %e, "dropping malformed refresh ack");
                return;
            }
        };

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(session) = state.session.as_mut() else {
            tracing::debug!(peer, broadcast_id, "ack with no session in flight");
            return;
        };
        if session.broadcast_id != broadcast_id {
            tracing::debug!(
                peer,
                broadcast_id,
                current = session.broadcast_id,
                "stale refresh ack"
            );
            return;
        }

        if let Some(pos) = session.pending.iter().position(|p| *p == peer) {
            session.pending.remove(pos);
            session.acked.insert(peer);
            tracing::debug!(peer, broadcast_id, remaining = session.pending.len(), "refresh acked");
        } else if session.acked.contains(&peer) {
            tracing::debug!(peer, broadcast_id, "duplicate refresh ack");
        } else {
            tracing::warn!(peer, broadcast_id, "refresh ack from peer outside the session");
        }
    }

    /// Drive the session forward. Completes it when every peer has
    /// acked or the deadline passed; otherwise re-sends the frame to
    /// the first straggler if a resend round is due. At most one peer
    /// is re-sent per call.
    pub fn tick(&self, now: Instant) -> Option<SyncOutcome> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let session = state.session.as_mut()?;

        if session.pending.is_empty() {
            let (id, generation) = (session.broadcast_id, session.generation);
            state.session = None;
            // Sentinel makes the next session unconditionally fresh.
            state.last_id = ID_SENTINEL;
            drop(state);
            self.busy.store(false, Ordering::Release);
            tracing::info!(broadcast_id = id, generation, "label broadcast fully acked");
            return Some(SyncOutcome::AllAcked);
        }

        if now >= session.deadline {
            let pending = std::mem::take(&mut session.pending);
            let (id, generation) = (session.broadcast_id, session.generation);
            // The id is abandoned, not reset: a late ack for it must
            // still look stale to the next session.
            state.session = None;
            drop(state);
            self.busy.store(false, Ordering::Release);
            tracing::warn!(
                broadcast_id = id,
                generation,
                stragglers = pending.len(),
                "label broadcast timed out"
            );
            return Some(SyncOutcome::TimedOut { pending });
        }

        if now >= session.next_check() {
            session.resends += 1;
            // Rotate so successive rounds reach every straggler, not
            // just the first one.
            let straggler = session.pending.remove(0);
            session.pending.push(straggler);
            let frame = session.frame.clone();
            tracing::debug!(
                peer = straggler,
                broadcast_id = session.broadcast_id,
                round = session.resends,
                "re-sending refresh to straggler"
            );
            drop(state);
            self.channel
                .send_to(straggler, Topic::GlobalRefresh, frame, Delivery::Reliable);
        }
        None
    }

    /// A peer announced its own label. Updates that peer's roster slot;
    /// returns whether anything changed.
    pub fn on_label_changed(
        &self,
        roster: &mut Roster,
        peer: PeerId,
        payload: &[u8],
    ) -> Result<bool, WireError> {
        let label = decode_label_changed(payload)?;
        if label.is_empty() {
            tracing::warn!(peer, "ignoring empty label announcement");
            return Ok(false);
        }
        match roster.slot_of(peer) {
            Some(slot) => {
                tracing::info!(peer, slot, label, "peer label updated");
                Ok(roster.set_label(slot, label))
            }
            None => {
                tracing::warn!(peer, "label change from a peer with no roster slot");
                Ok(false)
            }
        }
    }

    /// True while a session is in flight.
    pub fn broadcasting(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Sample a fresh broadcast id: nonzero and distinct from the previous
/// session's id.
fn fresh_id(last: u8) -> u8 {
    let mut rng = rand::thread_rng();
    loop {
        let id: u8 = rng.gen();
        if id != ID_SENTINEL && id != last {
            return id;
        }
    }
}

// ── Peer side ─────────────────────────────────────────────────────────────────

/// Peer-side view of the label table. Applies refresh frames and
/// produces the matching ack.
pub struct Follower<C> {
    channel: Arc<C>,
    labels: Vec<Option<String>>,
}

impl<C: MessageChannel> Follower<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            labels: Vec::new(),
        }
    }

    /// Replace the local label table from a refresh frame and ack it.
    pub fn on_refresh(&mut self, payload: &[u8]) -> Result<u8, WireError> {
        let refresh = decode_refresh(payload)?;
        tracing::debug!(
            broadcast_id = refresh.broadcast_id,
            slots = refresh.slots.len(),
            "applying label refresh"
        );
        self.labels = refresh.slots;
        self.channel.send_to(
            crate::channel::AUTHORITY,
            Topic::RefreshAck,
            encode_ack(refresh.broadcast_id),
            Delivery::Reliable,
        );
        Ok(refresh.broadcast_id)
    }

    /// Send this peer's label to the authority.
    pub fn announce_label(&self, label: &str) -> Result<(), WireError> {
        let frame = encode_label_changed(label)?;
        self.channel.send_to(
            crate::channel::AUTHORITY,
            Topic::LabelChanged,
            frame,
            Delivery::Reliable,
        );
        Ok(())
    }

    pub fn labels(&self) -> &[Option<String>] {
        &self.labels
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
