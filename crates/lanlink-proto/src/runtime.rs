//! Session runtime — tokio tasks that wire the protocol pieces to a
//! live channel.
//!
//! One task per role. The authority task owns the roster and the
//! broadcaster, answers latency probes, and drives the broadcast tick
//! once a second. The peer task owns the follower and the latency
//! probe and ticks on a 200 ms cadence so probe timeouts are noticed
//! promptly. Both stop on a shutdown signal or when their inbound
//! channel closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use lanlink_core::config::LanLinkConfig;

use crate::channel::{Inbound, MessageChannel, PeerId, SessionEvents, TelemetrySink, Topic, AUTHORITY};
use crate::latency::{epoch_ms, EchoResponder, LatencyProbe, Measurement};
use crate::roster::Roster;
use crate::sync::{Broadcaster, Follower, SyncOutcome};

const AUTHORITY_TICK: Duration = Duration::from_secs(1);
const PEER_TICK: Duration = Duration::from_millis(200);

// ── Authority ─────────────────────────────────────────────────────────────────

struct AuthorityShared<C, S> {
    sink: Arc<S>,
    roster: Mutex<Roster>,
    broadcaster: Broadcaster<C>,
    responder: EchoResponder<C>,
    join_label: String,
    sync_enabled: bool,
    // A broadcast requested while one is in flight; served on the next
    // idle tick.
    refresh_queued: AtomicBool,
}

impl<C: MessageChannel, S: TelemetrySink> AuthorityShared<C, S> {
    /// Start a broadcast now if the broadcaster is idle, otherwise
    /// queue one for the next idle tick.
    fn request_broadcast(&self) {
        if !self.sync_enabled {
            return;
        }
        let roster = self.roster.lock().unwrap_or_else(|e| e.into_inner());
        match self.broadcaster.start_broadcast(&roster, Instant::now()) {
            Ok(true) => {}
            Ok(false) => {
                self.refresh_queued.store(true, Ordering::Release);
            }
            Err(e) => tracing::error!(error = %e, "could not encode label refresh"),
        }
    }

    fn tick(&self) {
        if let Some(outcome) = self.broadcaster.tick(Instant::now()) {
            if let SyncOutcome::TimedOut { pending } = outcome {
                tracing::warn!(stragglers = pending.len(), "label sync incomplete");
                self.sink
                    .warning("Some peers may not have received the latest labels");
            }
        }
        if !self.broadcaster.broadcasting() && self.refresh_queued.swap(false, Ordering::AcqRel) {
            self.request_broadcast();
        }
    }

    fn handle_inbound(&self, msg: Inbound) {
        match msg.topic {
            Topic::LabelChanged => {
                let mut roster = self.roster.lock().unwrap_or_else(|e| e.into_inner());
                match self
                    .broadcaster
                    .on_label_changed(&mut roster, msg.from, &msg.payload)
                {
                    Ok(true) => {
                        drop(roster);
                        self.request_broadcast();
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!(peer = msg.from, error = %e, "bad label frame"),
                }
            }
            Topic::RefreshAck => self.broadcaster.on_ack(msg.from, &msg.payload),
            Topic::LatencyProbe => {
                let recv_ms = epoch_ms();
                if let Err(e) = self
                    .responder
                    .on_probe(msg.from, &msg.payload, recv_ms, epoch_ms())
                {
                    tracing::warn!(peer = msg.from, error = %e, "bad probe frame");
                }
            }
            other => tracing::debug!(peer = msg.from, topic = ?other, "unexpected frame for authority"),
        }
    }
}

/// Running authority task. Feed peer lifecycle into it through the
/// [`SessionEvents`] impl.
pub struct AuthorityHandle<C, S> {
    shared: Arc<AuthorityShared<C, S>>,
    stop: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl<C: MessageChannel + 'static, S: TelemetrySink + 'static> AuthorityHandle<C, S> {
    /// Current roster labels, in slot order.
    pub fn labels(&self) -> Vec<Option<String>> {
        let roster = self.shared.roster.lock().unwrap_or_else(|e| e.into_inner());
        roster
            .labels()
            .into_iter()
            .map(|l| l.map(str::to_string))
            .collect()
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

impl<C: MessageChannel + 'static, S: TelemetrySink + 'static> SessionEvents
    for AuthorityHandle<C, S>
{
    fn on_peer_joined(&self, peer: PeerId) {
        tracing::info!(peer, "peer joined the session");
        {
            let mut roster = self.shared.roster.lock().unwrap_or_else(|e| e.into_inner());
            roster.push_occupied(peer, self.shared.join_label.clone());
        }
        self.shared.request_broadcast();
    }

    fn on_peer_left(&self, peer: PeerId) {
        tracing::info!(peer, "peer left the session");
        {
            let mut roster = self.shared.roster.lock().unwrap_or_else(|e| e.into_inner());
            roster.vacate(peer);
        }
        self.shared.request_broadcast();
    }
}

/// Spawn the authority-side task over `channel`, consuming frames from
/// `inbound`.
pub fn spawn_authority<C, S>(
    channel: Arc<C>,
    sink: Arc<S>,
    config: &LanLinkConfig,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
) -> AuthorityHandle<C, S>
where
    C: MessageChannel + 'static,
    S: TelemetrySink + 'static,
{
    // The authority is itself a labelled participant in slot 0.
    let mut roster = Roster::new();
    roster.push_occupied(AUTHORITY, config.label_sync.host_default_label.clone());

    let shared = Arc::new(AuthorityShared {
        sink,
        roster: Mutex::new(roster),
        broadcaster: Broadcaster::new(channel.clone()),
        responder: EchoResponder::new(channel),
        join_label: config.label_sync.join_default_label.clone(),
        sync_enabled: config.label_sync.enabled,
        refresh_queued: AtomicBool::new(false),
    });

    let (stop, mut stop_rx) = broadcast::channel(1);
    let task_shared = shared.clone();
    let task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(AUTHORITY_TICK);
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => task_shared.handle_inbound(msg),
                    None => break,
                },
                _ = tick.tick() => task_shared.tick(),
            }
        }
        tracing::debug!("authority task stopped");
    });

    AuthorityHandle { shared, stop, task }
}

// ── Peer ──────────────────────────────────────────────────────────────────────

/// Running peer task.
pub struct PeerHandle {
    labels: watch::Receiver<Vec<Option<String>>>,
    stop: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl PeerHandle {
    /// Watch the label table as refreshes land.
    pub fn labels(&self) -> watch::Receiver<Vec<Option<String>>> {
        self.labels.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

/// Spawn the peer-side task: announce `label`, apply refreshes, and run
/// the latency probe.
pub fn spawn_peer<C, S>(
    channel: Arc<C>,
    sink: Arc<S>,
    config: &LanLinkConfig,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    label: &str,
) -> PeerHandle
where
    C: MessageChannel + 'static,
    S: TelemetrySink + 'static,
{
    let measurement = if config.latency.rtt_measurement {
        Measurement::RoundTrip
    } else {
        Measurement::OneWay
    };
    let latency_enabled = config.latency.enabled;
    let mut probe = LatencyProbe::new(
        channel.clone(),
        sink,
        measurement,
        config.latency.custom_probe,
        config.latency.warn_on_failure,
    );

    let mut follower = Follower::new(channel);
    if config.label_sync.enabled {
        if let Err(e) = follower.announce_label(label) {
            tracing::warn!(label, error = %e, "label not announced");
        }
    }

    let (labels_tx, labels_rx) = watch::channel(Vec::new());
    let (stop, mut stop_rx) = broadcast::channel(1);
    let task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(PEER_TICK);
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => match msg.topic {
                        Topic::GlobalRefresh => match follower.on_refresh(&msg.payload) {
                            Ok(_) => {
                                let _ = labels_tx.send(follower.labels().to_vec());
                            }
                            Err(e) => tracing::warn!(error = %e, "bad refresh frame"),
                        },
                        Topic::LatencyEcho => {
                            if let Err(e) = probe.on_echo(&msg.payload, epoch_ms()) {
                                tracing::warn!(error = %e, "bad echo frame");
                            }
                        }
                        other => {
                            tracing::debug!(topic = ?other, "unexpected frame for peer")
                        }
                    },
                    None => break,
                },
                _ = tick.tick(), if latency_enabled => {
                    probe.tick(Instant::now(), epoch_ms());
                }
            }
        }
        tracing::debug!("peer task stopped");
    });

    PeerHandle {
        labels: labels_rx,
        stop,
        task,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
