//! Field codec — the primitives every LanLink message is built from.
//!
//! Three field shapes exist on the wire: a single byte, a short string
//! (1-byte length followed by that many raw ASCII bytes), and a 64-bit
//! big-endian integer used for epoch-millisecond timestamps.
//!
//! Decoding never panics and never reads past a declared length. A
//! failed field read leaves the cursor where the failure occurred;
//! callers must stop processing the current message on the first error
//! and discard the rest of the buffer. Nothing is ever partially
//! applied from a malformed message.

use bytes::{BufMut, Bytes, BytesMut};

/// Maximum byte length of a short string field. The length prefix is a
/// single byte, so this is a wire-format limit, not a tunable.
pub const MAX_SHORT_STR: usize = 255;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise while reading or writing field data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("truncated field: needed {needed} bytes, {remaining} remain")]
    Truncated { needed: usize, remaining: usize },

    #[error("string of {0} bytes exceeds the {MAX_SHORT_STR}-byte field limit")]
    Oversize(usize),

    #[error("string field contains non-ASCII bytes")]
    NotAscii,
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Append-only field writer over a growable buffer.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: BytesMut,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Write a length-prefixed ASCII string.
    /// Fails without touching the buffer if the string is longer than
    /// [`MAX_SHORT_STR`] bytes or contains non-ASCII characters.
    pub fn put_short_str(&mut self, value: &str) -> Result<(), CodecError> {
        if value.len() > MAX_SHORT_STR {
            return Err(CodecError::Oversize(value.len()));
        }
        if !value.is_ascii() {
            return Err(CodecError::NotAscii);
        }
        self.buf.put_u8(value.len() as u8);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Write a 64-bit big-endian integer (epoch-millisecond timestamps).
    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Cursor over a received byte buffer.
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < needed {
            return Err(CodecError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Read a length-prefixed ASCII string.
    pub fn short_str(&mut self) -> Result<String, CodecError> {
        let len = self.u8()? as usize;
        let raw = self.take(len)?;
        if !raw.is_ascii() {
            return Err(CodecError::NotAscii);
        }
        // ASCII is valid UTF-8 by construction.
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        let raw = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(u64::from_be_bytes(bytes))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
