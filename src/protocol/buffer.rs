//! Wire Buffer
//!
//! Length-prefixed framing for the EdgeDB binary protocol.
//!
//! Frame layout (big-endian):
//! - type tag (1 byte)
//! - length (4 bytes, counts itself but not the tag)
//! - payload (length - 4 bytes)
//!
//! `WriteBuffer` composes outgoing frames and back-patches their lengths.
//! `ReadBuffer` slices complete frames out of the incoming byte stream and
//! hands them out as `Message` windows that must be consumed exactly.

use super::error::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

/// Size of the length field. The field counts itself.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Type tag plus length field.
pub const HEADER_SIZE: usize = 1 + LENGTH_PREFIX_SIZE;

/// Width of an encoded UUID.
pub const UUID_SIZE: usize = 16;

const INITIAL_CAPACITY: usize = 8192;

// ==================== Writer ====================

/// Accumulates outgoing messages until they are taken for transmission.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    buf: BytesMut,
    /// Offsets of reserved length fields. The bottom entry belongs to the
    /// open message, anything above it to nested byte blocks.
    placeholders: Vec<usize>,
    open_message: Option<u8>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            placeholders: Vec::with_capacity(4),
            open_message: None,
        }
    }

    /// Write the type tag and reserve the length field of a new message.
    pub fn begin_message(&mut self, msg_type: u8) -> Result<(), WireError> {
        if self.open_message.is_some() {
            return Err(WireError::MessageAlreadyOpen);
        }
        self.buf.put_u8(msg_type);
        self.placeholders.push(self.buf.len());
        self.buf.put_u32(0);
        self.open_message = Some(msg_type);
        Ok(())
    }

    /// Back-patch the length of the open message.
    pub fn end_message(&mut self) -> Result<(), WireError> {
        let msg_type = self.open_message.ok_or(WireError::NoOpenMessage)?;
        if self.placeholders.len() != 1 {
            return Err(WireError::UnterminatedMessage { msg_type });
        }
        let pos = self.placeholders.pop().ok_or(WireError::NoOpenMessage)?;
        self.patch_length(pos, self.buf.len() - pos)?;
        self.open_message = None;
        Ok(())
    }

    /// Reserve a length prefix for a nested byte block.
    ///
    /// Unlike message lengths, block lengths do not count the prefix.
    pub fn begin_bytes(&mut self) {
        self.placeholders.push(self.buf.len());
        self.buf.put_u32(0);
    }

    pub fn end_bytes(&mut self) -> Result<(), WireError> {
        let floor = usize::from(self.open_message.is_some());
        if self.placeholders.len() <= floor {
            return Err(WireError::NoOpenMessage);
        }
        let pos = self.placeholders.pop().ok_or(WireError::NoOpenMessage)?;
        self.patch_length(pos, self.buf.len() - pos - LENGTH_PREFIX_SIZE)
    }

    fn patch_length(&mut self, pos: usize, len: usize) -> Result<(), WireError> {
        let len = u32::try_from(len).map_err(|_| WireError::TooLarge { len })?;
        self.buf[pos..pos + LENGTH_PREFIX_SIZE].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }

    #[inline]
    pub fn push_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn push_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    #[inline]
    pub fn push_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    #[inline]
    pub fn push_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    #[inline]
    pub fn push_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    #[inline]
    pub fn push_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    #[inline]
    pub fn push_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    #[inline]
    pub fn push_f32(&mut self, v: f32) {
        self.buf.put_f32(v);
    }

    #[inline]
    pub fn push_f64(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    #[inline]
    pub fn push_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    pub fn push_uuid(&mut self, v: &Uuid) {
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Append a 4-byte length prefix followed by the raw bytes.
    pub fn push_bytes(&mut self, v: &[u8]) -> Result<(), WireError> {
        let len = u32::try_from(v.len()).map_err(|_| WireError::TooLarge { len: v.len() })?;
        self.buf.reserve(LENGTH_PREFIX_SIZE + v.len());
        self.buf.put_u32(len);
        self.buf.extend_from_slice(v);
        Ok(())
    }

    pub fn push_str(&mut self, v: &str) -> Result<(), WireError> {
        self.push_bytes(v.as_bytes())
    }

    /// Drain every completed message for transmission.
    pub fn take(&mut self) -> Result<Bytes, WireError> {
        if let Some(msg_type) = self.open_message {
            return Err(WireError::UnterminatedMessage { msg_type });
        }
        if !self.placeholders.is_empty() {
            return Err(WireError::NoOpenMessage);
        }
        Ok(self.buf.split().freeze())
    }

    /// Drop all pending bytes and open placeholders.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.placeholders.clear();
        self.open_message = None;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

// ==================== Reader ====================

/// Bounded read window over wire bytes.
///
/// Every pop checks the window first and fails with `WireError::Underrun`
/// instead of returning partial data.
#[derive(Debug, Clone, Default)]
pub struct Reader {
    buf: Bytes,
}

impl Reader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        if self.buf.len() < needed {
            return Err(WireError::Underrun {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn pop_u8(&mut self) -> Result<u8, WireError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn pop_u16(&mut self) -> Result<u16, WireError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn pop_u32(&mut self) -> Result<u32, WireError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn pop_u64(&mut self) -> Result<u64, WireError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    pub fn pop_i16(&mut self) -> Result<i16, WireError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn pop_i32(&mut self) -> Result<i32, WireError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn pop_i64(&mut self) -> Result<i64, WireError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn pop_f32(&mut self) -> Result<f32, WireError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn pop_f64(&mut self) -> Result<f64, WireError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    /// Read one byte; any nonzero value is `true`.
    pub fn pop_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.pop_u8()? != 0)
    }

    /// Read 16 bytes verbatim.
    pub fn pop_uuid(&mut self) -> Result<Uuid, WireError> {
        self.ensure(UUID_SIZE)?;
        let mut raw = [0u8; UUID_SIZE];
        self.buf.copy_to_slice(&mut raw);
        Ok(Uuid::from_bytes(raw))
    }

    /// Read exactly `n` raw bytes without a length prefix.
    pub fn pop_slice(&mut self, n: usize) -> Result<Bytes, WireError> {
        self.ensure(n)?;
        Ok(self.buf.split_to(n))
    }

    /// Read a 4-byte length prefix, then that many bytes.
    pub fn pop_bytes(&mut self) -> Result<Bytes, WireError> {
        let len = self.peek_u32()? as usize;
        self.ensure(LENGTH_PREFIX_SIZE.saturating_add(len))?;
        self.buf.advance(LENGTH_PREFIX_SIZE);
        Ok(self.buf.split_to(len))
    }

    pub fn pop_string(&mut self) -> Result<String, WireError> {
        let raw = self.pop_bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    /// Split off a child window of `n` bytes.
    pub fn pop_window(&mut self, n: usize) -> Result<Reader, WireError> {
        Ok(Reader::new(self.pop_slice(n)?))
    }

    pub fn peek_u32(&self) -> Result<u32, WireError> {
        self.ensure(4)?;
        Ok(u32::from_be_bytes([
            self.buf[0],
            self.buf[1],
            self.buf[2],
            self.buf[3],
        ]))
    }

    /// Skip `n` bytes without decoding them.
    pub fn discard(&mut self, n: usize) -> Result<(), WireError> {
        self.ensure(n)?;
        self.buf.advance(n);
        Ok(())
    }
}

// ==================== Message ====================

/// One framed message: its type tag and the unread part of its payload.
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: u8,
    body: Reader,
}

impl Message {
    pub fn new(msg_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            body: Reader::new(payload),
        }
    }

    /// Assert the payload was consumed exactly.
    pub fn finish(self) -> Result<(), WireError> {
        if !self.body.is_empty() {
            return Err(WireError::UnreadData {
                msg_type: self.msg_type,
                remaining: self.body.remaining(),
            });
        }
        Ok(())
    }
}

impl Deref for Message {
    type Target = Reader;

    fn deref(&self) -> &Reader {
        &self.body
    }
}

impl DerefMut for Message {
    fn deref_mut(&mut self) -> &mut Reader {
        &mut self.body
    }
}

/// Incoming byte stream, sliced into messages as they complete.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    buf: BytesMut,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Raw storage for socket reads (`read_buf`).
    pub fn inner_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Buffered bytes not yet handed out as messages.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Split off the next complete frame.
    ///
    /// Returns `Ok(None)` when the buffered input ends mid-frame; the partial
    /// frame stays buffered until more bytes arrive.
    pub fn next_message(&mut self) -> Result<Option<Message>, WireError> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let msg_type = self.buf[0];
        let length = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
        if (length as usize) < LENGTH_PREFIX_SIZE {
            return Err(WireError::InvalidLength { msg_type, length });
        }

        let total = 1 + length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(total).freeze();
        frame.advance(HEADER_SIZE);
        Ok(Some(Message::new(msg_type, frame)))
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
