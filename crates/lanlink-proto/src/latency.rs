//! Peer-to-authority latency probing.
//!
//! Every three seconds a peer sends a timestamped probe; the authority
//! echoes the timestamp back and the peer derives round-trip time from
//! its own clock. If the very first probe cycle times out the authority
//! is assumed not to speak the probe protocol and the peer permanently
//! switches to reading the transport's own RTT metric instead. Later
//! timeouts keep the custom protocol, report the elapsed wait as an
//! elevated estimate, and warn at most once per failure streak.
//!
//! The echo also carries the authority's internal processing delay; a
//! sustained delay above 600 ms raises a single "server is slow"
//! warning until the delay recovers.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::time::Instant;
use zerocopy::AsBytes;

use lanlink_core::wire::{ProbeEcho, ProbePing, WireError};

use crate::channel::{Delivery, MessageChannel, PeerId, TelemetrySink, Topic, AUTHORITY};

/// Probe cadence.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(3);

/// How long a probe may wait for its echo.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(4500);

/// Wait after a failed cycle before the next probe goes out.
pub const RETRY_THROTTLE: Duration = Duration::from_millis(1500);

/// Authority processing delay that counts as "server is slow".
pub const AUTHORITY_DELAY_WARN_MS: u64 = 600;

/// Milliseconds since the Unix epoch, for probe timestamps.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Modes ─────────────────────────────────────────────────────────────────────

/// What the reported number means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    RoundTrip,
    /// Half the round trip, as a symmetric-path estimate.
    OneWay,
}

impl Measurement {
    fn shape(self, rtt_ms: u64) -> u64 {
        match self {
            Measurement::RoundTrip => rtt_ms,
            Measurement::OneWay => rtt_ms / 2,
        }
    }
}

/// Where latency numbers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Timestamped probe/echo exchange with the authority.
    Custom,
    /// Transport-provided RTT. Entered permanently when the first-ever
    /// probe cycle times out.
    Transport,
}

struct Awaiting {
    sent_at_ms: u64,
    waiting_since: Instant,
}

// ── Peer side ─────────────────────────────────────────────────────────────────

/// Peer-owned probe state machine. Drive it with [`tick`] on a short
/// cadence and feed authority echoes into [`on_echo`].
///
/// [`tick`]: LatencyProbe::tick
/// [`on_echo`]: LatencyProbe::on_echo
pub struct LatencyProbe<C, S> {
    channel: Arc<C>,
    sink: Arc<S>,
    measurement: Measurement,
    warn_on_failure: bool,
    mode: ProbeMode,
    awaiting: Option<Awaiting>,
    next_probe_at: Option<Instant>,
    ever_succeeded: bool,
    // Send time of the first unanswered probe of the current failure
    // streak; the elevated estimate accrues from here.
    failing_since: Option<Instant>,
    streak_warned: bool,
    authority_slow_warned: bool,
}

impl<C: MessageChannel, S: TelemetrySink> LatencyProbe<C, S> {
    pub fn new(
        channel: Arc<C>,
        sink: Arc<S>,
        measurement: Measurement,
        use_custom_protocol: bool,
        warn_on_failure: bool,
    ) -> Self {
        Self {
            channel,
            sink,
            measurement,
            warn_on_failure,
            mode: if use_custom_protocol {
                ProbeMode::Custom
            } else {
                ProbeMode::Transport
            },
            awaiting: None,
            next_probe_at: None,
            ever_succeeded: false,
            failing_since: None,
            streak_warned: false,
            authority_slow_warned: false,
        }
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    /// Advance the state machine. `now_ms` is the epoch-millisecond
    /// reading of the same moment as `now`; tests pass a synthetic
    /// clock pair.
    pub fn tick(&mut self, now: Instant, now_ms: u64) {
        if let Some(awaiting) = self.awaiting.take() {
            if now.duration_since(awaiting.waiting_since) < PROBE_TIMEOUT {
                self.awaiting = Some(awaiting);
                return;
            }
            if !self.ever_succeeded {
                // An authority that never answered the first cycle does
                // not speak the probe protocol at all.
                tracing::warn!("first probe cycle timed out, switching to transport RTT");
                if self.warn_on_failure {
                    self.sink.warning(
                        "Server does not support fast latency measurement; using transport estimate",
                    );
                }
                self.mode = ProbeMode::Transport;
                self.next_probe_at = None;
            } else {
                let failing_since = *self.failing_since.get_or_insert(awaiting.waiting_since);
                let elevated_ms = now.duration_since(failing_since).as_millis() as u64;
                tracing::warn!(elevated_ms, "probe echo overdue");
                // The accrued wait itself is the estimate, reported as-is
                // regardless of measurement mode.
                self.sink.latency_sample(elevated_ms);
                if self.warn_on_failure && !self.streak_warned {
                    self.sink.warning("Latency probe timed out; connection may be degraded");
                    self.streak_warned = true;
                }
                self.next_probe_at = Some(now + RETRY_THROTTLE);
            }
        }

        match self.mode {
            ProbeMode::Custom => {
                if self.next_probe_at.map_or(true, |at| now >= at) {
                    self.send_probe(now, now_ms);
                }
            }
            ProbeMode::Transport => {
                if self.next_probe_at.map_or(true, |at| now >= at) {
                    self.next_probe_at = Some(now + PROBE_INTERVAL);
                    match self.channel.transport_rtt_ms(AUTHORITY) {
                        Some(rtt) => self.sink.latency_sample(self.measurement.shape(rtt)),
                        None => tracing::debug!("transport RTT not available yet"),
                    }
                }
            }
        }
    }

    fn send_probe(&mut self, now: Instant, now_ms: u64) {
        let ping = ProbePing::new(now_ms);
        self.channel.send_to(
            AUTHORITY,
            Topic::LatencyProbe,
            Bytes::copy_from_slice(ping.as_bytes()),
            Delivery::Unreliable,
        );
        self.awaiting = Some(Awaiting {
            sent_at_ms: now_ms,
            waiting_since: now,
        });
        self.next_probe_at = Some(now + PROBE_INTERVAL);
        tracing::trace!(sent_at_ms = now_ms, "probe sent");
    }

    /// Handle an echo from the authority.
    pub fn on_echo(&mut self, payload: &[u8], now_ms: u64) -> Result<(), WireError> {
        let echo = ProbeEcho::parse(payload)?;
        let echoed = echo.sent_at_ms.get();

        let Some(awaiting) = &self.awaiting else {
            tracing::debug!(echoed, "echo with no probe in flight");
            return Ok(());
        };
        if awaiting.sent_at_ms != echoed {
            tracing::debug!(echoed, expected = awaiting.sent_at_ms, "stale probe echo");
            return Ok(());
        }

        self.awaiting = None;
        self.ever_succeeded = true;
        self.failing_since = None;
        self.streak_warned = false;

        let rtt = now_ms.saturating_sub(echoed);
        self.sink.latency_sample(self.measurement.shape(rtt));
        tracing::trace!(rtt_ms = rtt, "probe round trip measured");

        let delay = echo.authority_delay_ms();
        if delay > AUTHORITY_DELAY_WARN_MS {
            if !self.authority_slow_warned {
                self.authority_slow_warned = true;
                tracing::warn!(delay_ms = delay, "authority processing delay is high");
                self.sink.warning("Server is slow to respond; gameplay may lag");
            }
        } else {
            self.authority_slow_warned = false;
        }
        Ok(())
    }
}

// ── Authority side ────────────────────────────────────────────────────────────

/// Authority-side half: echo each probe back immediately, attaching
/// receive and send timestamps so peers can judge our processing delay.
pub struct EchoResponder<C> {
    channel: Arc<C>,
}

impl<C: MessageChannel> EchoResponder<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self { channel }
    }

    pub fn on_probe(
        &self,
        peer: PeerId,
        payload: &[u8],
        recv_ms: u64,
        send_ms: u64,
    ) -> Result<(), WireError> {
        let ping = ProbePing::parse(payload)?;
        let echo = ProbeEcho::new(ping.sent_at_ms.get(), recv_ms, send_ms);
        self.channel.send_to(
            peer,
            Topic::LatencyEcho,
            Bytes::copy_from_slice(echo.as_bytes()),
            Delivery::Unreliable,
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
