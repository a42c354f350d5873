//! LanLink wire format — on-wire layout for every protocol message.
//!
//! These layouts ARE the protocol. Every field and every length prefix
//! is load-bearing; changing anything here breaks interop with peers
//! running the released format.
//!
//! Variable-size messages (label sync) are built from the field codec.
//! Fixed-size messages (latency probe/echo) are #[repr(C, packed)]
//! zerocopy structs with big-endian integer fields and compile-time
//! size guards. There is no unsafe code in this module.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::codec::{CodecError, FieldReader, FieldWriter};

/// Product tag carried in directory TXT payloads: `LANLINK_<addr>:<port>`.
pub const PRODUCT_TAG: &str = "LANLINK";

/// A refresh frame addresses slots with a single count byte.
pub const MAX_PEER_SLOTS: usize = 255;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("peer table has {0} slots, a refresh frame can carry at most {MAX_PEER_SLOTS}")]
    TooManySlots(usize),

    #[error("fixed-size payload is {got} bytes, expected {expected}")]
    BadSize { got: usize, expected: usize },
}

// ── LabelChanged (peer → authority) ───────────────────────────────────────────

/// `[len:1][ascii bytes: len]`
pub fn encode_label_changed(label: &str) -> Result<Bytes, WireError> {
    let mut w = FieldWriter::with_capacity(1 + label.len());
    w.put_short_str(label)?;
    Ok(w.finish())
}

pub fn decode_label_changed(payload: &[u8]) -> Result<String, WireError> {
    let mut r = FieldReader::new(payload);
    Ok(r.short_str()?)
}

// ── GlobalRefresh (authority → peer) ──────────────────────────────────────────

/// Decoded refresh frame. `None` slots are unoccupied (zero-length on
/// the wire) and must be skipped by the reader, not treated as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refresh {
    pub broadcast_id: u8,
    pub slots: Vec<Option<String>>,
}

/// `[broadcastId:1][peerCount:1]{[labelLen:1][ascii: labelLen]}×peerCount`
///
/// Unoccupied slots are encoded as a bare zero length byte.
pub fn encode_refresh(broadcast_id: u8, slots: &[Option<&str>]) -> Result<Bytes, WireError> {
    if slots.len() > MAX_PEER_SLOTS {
        return Err(WireError::TooManySlots(slots.len()));
    }

    let mut w = FieldWriter::with_capacity(2 + slots.len() * 8);
    w.put_u8(broadcast_id);
    w.put_u8(slots.len() as u8);
    for slot in slots {
        match slot {
            Some(label) => w.put_short_str(label)?,
            None => w.put_u8(0),
        }
    }
    Ok(w.finish())
}

pub fn decode_refresh(payload: &[u8]) -> Result<Refresh, WireError> {
    let mut r = FieldReader::new(payload);
    let broadcast_id = r.u8()?;
    let count = r.u8()? as usize;

    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        let label = r.short_str()?;
        if label.is_empty() {
            slots.push(None);
        } else {
            slots.push(Some(label));
        }
    }
    Ok(Refresh { broadcast_id, slots })
}

// ── RefreshAck (peer → authority) ─────────────────────────────────────────────

/// `[broadcastId:1]`
pub fn encode_ack(broadcast_id: u8) -> Bytes {
    let mut w = FieldWriter::with_capacity(1);
    w.put_u8(broadcast_id);
    w.finish()
}

pub fn decode_ack(payload: &[u8]) -> Result<u8, WireError> {
    let mut r = FieldReader::new(payload);
    Ok(r.u8()?)
}

// ── Latency probe (peer → authority) ──────────────────────────────────────────

/// A latency probe carries only the sender's epoch-millisecond send
/// timestamp. The authority echoes it back unchanged, so the sender can
/// compute round-trip time from its own clock alone — no clock
/// agreement between peer and authority is required.
///
/// Wire size: 8 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct ProbePing {
    pub sent_at_ms: U64<BigEndian>,
}

assert_eq_size!(ProbePing, [u8; 8]);

impl ProbePing {
    pub fn new(sent_at_ms: u64) -> Self {
        Self {
            sent_at_ms: U64::new(sent_at_ms),
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, WireError> {
        Self::read_from(payload).ok_or(WireError::BadSize {
            got: payload.len(),
            expected: std::mem::size_of::<Self>(),
        })
    }
}

// ── Latency echo (authority → peer) ───────────────────────────────────────────

/// Echo of a [`ProbePing`]. `sent_at_ms` is returned verbatim; the two
/// authority timestamps expose the authority's internal processing
/// delay (send minus receive) as a secondary health signal.
///
/// Wire size: 24 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct ProbeEcho {
    pub sent_at_ms: U64<BigEndian>,
    pub authority_recv_ms: U64<BigEndian>,
    pub authority_send_ms: U64<BigEndian>,
}

assert_eq_size!(ProbeEcho, [u8; 24]);

impl ProbeEcho {
    pub fn new(sent_at_ms: u64, authority_recv_ms: u64, authority_send_ms: u64) -> Self {
        Self {
            sent_at_ms: U64::new(sent_at_ms),
            authority_recv_ms: U64::new(authority_recv_ms),
            authority_send_ms: U64::new(authority_send_ms),
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, WireError> {
        Self::read_from(payload).ok_or(WireError::BadSize {
            got: payload.len(),
            expected: std::mem::size_of::<Self>(),
        })
    }

    /// Authority-side processing delay in milliseconds.
    pub fn authority_delay_ms(&self) -> u64 {
        let recv = self.authority_recv_ms;
        let send = self.authority_send_ms;
        send.get().saturating_sub(recv.get())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
