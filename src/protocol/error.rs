//! Protocol-level errors for the EdgeDB wire format.
//!
//! Shared by the buffer, the message decoder and the scalar codecs.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while framing, reading or writing wire data.
///
/// None of these are recoverable: once one is returned the byte stream can
/// no longer be trusted and the connection must be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A pop asked for more bytes than the current window holds.
    #[error("buffer underrun: needed {needed} bytes, {remaining} remaining")]
    Underrun { needed: usize, remaining: usize },

    /// A message was finished with bytes still unread.
    #[error("cannot finish: unread data in buffer (message type: 0x{msg_type:x}, {remaining} bytes left)")]
    UnreadData { msg_type: u8, remaining: usize },

    /// A frame header declared a length smaller than the length field itself.
    #[error("invalid frame length {length} for message type 0x{msg_type:x}")]
    InvalidLength { msg_type: u8, length: u32 },

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// `begin_message` was called while another message was still open.
    #[error("cannot begin message: previous message is still open")]
    MessageAlreadyOpen,

    /// `end_message` / `end_bytes` was called with nothing open.
    #[error("cannot end message: no message is open")]
    NoOpenMessage,

    /// The writer was drained, or a message ended, with a length block still open.
    #[error("message 0x{msg_type:x} still has an open length block")]
    UnterminatedMessage { msg_type: u8 },

    /// A value does not fit in a 4-byte length prefix.
    #[error("value of {len} bytes exceeds the u32 length prefix")]
    TooLarge { len: usize },
}

/// Error severity as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fatal,
    Panic,
    Other(u8),
}

impl Severity {
    pub fn from_byte(b: u8) -> Self {
        match b {
            120 => Severity::Error,
            200 => Severity::Fatal,
            255 => Severity::Panic,
            other => Severity::Other(other),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
            Severity::Panic => write!(f, "PANIC"),
            Severity::Other(b) => write!(f, "SEVERITY({})", b),
        }
    }
}

/// Attribute key for the hint text of an error response.
pub const ATTR_HINT: u16 = 0x0001;
/// Attribute key for the details text of an error response.
pub const ATTR_DETAILS: u16 = 0x0002;

/// Structured error decoded from an ErrorResponse message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub severity: Severity,
    pub code: u32,
    pub message: String,
    pub attributes: HashMap<u16, Bytes>,
}

impl ServerError {
    pub fn hint(&self) -> Option<&str> {
        self.attribute_str(ATTR_HINT)
    }

    pub fn details(&self) -> Option<&str> {
        self.attribute_str(ATTR_DETAILS)
    }

    fn attribute_str(&self, key: u16) -> Option<&str> {
        self.attributes
            .get(&key)
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 0x{:08x}: {}", self.severity, self.code, self.message)?;
        if let Some(hint) = self.hint() {
            write!(f, " (hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}
