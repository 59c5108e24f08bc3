//! EdgeDB Wire Protocol Messages
//!
//! Handshake and authentication subset of the binary protocol, version 0.8.

use super::buffer::{Message, WriteBuffer};
use super::error::{ServerError, Severity, WireError};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;

/// Message type tags.
pub mod msg_type {
    // Client -> server
    pub const CLIENT_HANDSHAKE: u8 = b'V';
    pub const SASL_INITIAL_RESPONSE: u8 = b'p';
    pub const SASL_RESPONSE: u8 = b'r';
    pub const TERMINATE: u8 = b'X';

    // Server -> client
    pub const SERVER_HANDSHAKE: u8 = b'v';
    pub const SERVER_KEY_DATA: u8 = b'K';
    pub const READY_FOR_COMMAND: u8 = b'Z';
    pub const AUTHENTICATION: u8 = b'R';
    pub const ERROR_RESPONSE: u8 = b'E';
}

/// Authentication status codes carried by `R` messages.
pub mod auth_status {
    pub const OK: u32 = 0x0;
    pub const SASL: u32 = 0xa;
    pub const SASL_CONTINUE: u32 = 0xb;
    pub const SASL_FINAL: u32 = 0xc;
}

/// Length of the opaque key carried by ServerKeyData.
pub const KEY_DATA_SIZE: usize = 32;

/// SASL mechanism this client speaks.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// Protocol version as (major, minor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// The only version this client accepts. No downgrade negotiation.
    pub const CURRENT: ProtocolVersion = ProtocolVersion { major: 0, minor: 8 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Transaction state reported by ReadyForCommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    NotInTransaction, // 'I'
    InTransaction,       // 'T'
    InFailedTransaction, // 'E'
}

impl TransactionState {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'I' => Some(TransactionState::NotInTransaction),
            b'T' => Some(TransactionState::InTransaction),
            b'E' => Some(TransactionState::InFailedTransaction),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            TransactionState::NotInTransaction => b'I',
            TransactionState::InTransaction => b'T',
            TransactionState::InFailedTransaction => b'E',
        }
    }
}

/// Frontend (client → server) messages used during connection setup.
#[derive(Debug, Clone)]
pub enum ClientMessage<'a> {
    /// First message on a fresh connection.
    ClientHandshake {
        version: ProtocolVersion,
        params: &'a [(&'a str, &'a str)],
    },
    /// Opens the SASL exchange.
    SaslInitialResponse { mechanism: &'a str, data: &'a str },
    /// Every following SASL step.
    SaslResponse { data: &'a str },
    Terminate,
}

impl ClientMessage<'_> {
    /// Encode into the writer as one complete frame.
    pub fn encode(&self, buf: &mut WriteBuffer) -> Result<(), WireError> {
        match self {
            ClientMessage::ClientHandshake { version, params } => {
                buf.begin_message(msg_type::CLIENT_HANDSHAKE)?;
                buf.push_u16(version.major);
                buf.push_u16(version.minor);
                buf.push_u16(u16::try_from(params.len()).map_err(|_| WireError::TooLarge {
                    len: params.len(),
                })?);
                for (name, value) in params.iter() {
                    buf.push_str(name)?;
                    buf.push_str(value)?;
                }
                buf.push_u16(0); // extensions
            }
            ClientMessage::SaslInitialResponse { mechanism, data } => {
                buf.begin_message(msg_type::SASL_INITIAL_RESPONSE)?;
                buf.push_str(mechanism)?;
                buf.push_str(data)?;
            }
            ClientMessage::SaslResponse { data } => {
                buf.begin_message(msg_type::SASL_RESPONSE)?;
                buf.push_str(data)?;
            }
            ClientMessage::Terminate => {
                buf.begin_message(msg_type::TERMINATE)?;
            }
        }
        buf.end_message()
    }
}

/// Authentication request variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Ok,
    /// Server demands SASL; lists the mechanisms it offers.
    Sasl { methods: Vec<Bytes> },
    SaslContinue { data: String },
    SaslFinal { data: String },
    /// Any other status. Its payload layout is unknown and is dropped.
    Other { status: u32 },
}

impl Authentication {
    /// Status code as it appears on the wire.
    pub fn status(&self) -> u32 {
        match self {
            Authentication::Ok => auth_status::OK,
            Authentication::Sasl { .. } => auth_status::SASL,
            Authentication::SaslContinue { .. } => auth_status::SASL_CONTINUE,
            Authentication::SaslFinal { .. } => auth_status::SASL_FINAL,
            Authentication::Other { status } => *status,
        }
    }
}

/// Backend (server → client) messages seen during connection setup.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    ServerHandshake {
        version: ProtocolVersion,
        extensions: Vec<String>,
    },
    ServerKeyData([u8; KEY_DATA_SIZE]),
    ReadyForCommand(TransactionState),
    Authentication(Authentication),
    ErrorResponse(ServerError),
    /// Any tag outside the handshake subset. The payload is dropped.
    Unknown(u8),
}

impl ServerMessage {
    /// Decode a framed message, consuming its payload exactly.
    ///
    /// An `Unknown` message is returned without touching the payload, since
    /// its layout is not known; callers reject it.
    pub fn decode(mut msg: Message) -> Result<Self, WireError> {
        let decoded = match msg.msg_type {
            msg_type::SERVER_HANDSHAKE => Self::decode_server_handshake(&mut msg)?,
            msg_type::SERVER_KEY_DATA => {
                let raw = msg.pop_slice(KEY_DATA_SIZE)?;
                let mut key = [0u8; KEY_DATA_SIZE];
                key.copy_from_slice(&raw);
                ServerMessage::ServerKeyData(key)
            }
            msg_type::READY_FOR_COMMAND => Self::decode_ready_for_command(&mut msg)?,
            msg_type::AUTHENTICATION => Self::decode_auth(&mut msg)?,
            // The exchange is over once an error arrives; trailing bytes
            // are not checked.
            msg_type::ERROR_RESPONSE => {
                return Ok(ServerMessage::ErrorResponse(Self::decode_error_response(
                    &mut msg,
                )?));
            }
            other => return Ok(ServerMessage::Unknown(other)),
        };
        msg.finish()?;
        Ok(decoded)
    }

    fn decode_server_handshake(msg: &mut Message) -> Result<Self, WireError> {
        let major = msg.pop_u16()?;
        let minor = msg.pop_u16()?;

        // Extension list is optional and ignored.
        let mut extensions = Vec::new();
        if !msg.is_empty() {
            let count = msg.pop_u16()?;
            for _ in 0..count {
                extensions.push(msg.pop_string()?);
                skip_headers(msg)?;
            }
        }

        Ok(ServerMessage::ServerHandshake {
            version: ProtocolVersion::new(major, minor),
            extensions,
        })
    }

    fn decode_ready_for_command(msg: &mut Message) -> Result<Self, WireError> {
        skip_headers(msg)?;
        let raw = msg.pop_u8()?;
        // Unrecognized markers are kept as "not in transaction"; the
        // handshake never acts on this value.
        let state = TransactionState::from_byte(raw).unwrap_or_default();
        Ok(ServerMessage::ReadyForCommand(state))
    }

    fn decode_auth(msg: &mut Message) -> Result<Self, WireError> {
        let status = msg.pop_u32()?;
        let auth = match status {
            auth_status::OK => Authentication::Ok,
            auth_status::SASL_CONTINUE => Authentication::SaslContinue {
                data: msg.pop_string()?,
            },
            auth_status::SASL_FINAL => Authentication::SaslFinal {
                data: msg.pop_string()?,
            },
            auth_status::SASL => {
                let count = msg.pop_u32()?;
                let mut methods = Vec::new();
                for _ in 0..count {
                    methods.push(msg.pop_bytes()?);
                }
                Authentication::Sasl { methods }
            }
            status => {
                let remaining = msg.remaining();
                msg.discard(remaining)?;
                Authentication::Other { status }
            }
        };
        Ok(ServerMessage::Authentication(auth))
    }

    /// Severity, code, message, then `count:uint16` attributes of
    /// `key:uint16 | value:bytes`.
    pub fn decode_error_response(msg: &mut Message) -> Result<ServerError, WireError> {
        let severity = Severity::from_byte(msg.pop_u8()?);
        let code = msg.pop_u32()?;
        let message = msg.pop_string()?;

        let count = msg.pop_u16()?;
        let mut attributes = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let key = msg.pop_u16()?;
            let value = msg.pop_bytes()?;
            attributes.insert(key, value);
        }

        Ok(ServerError {
            severity,
            code,
            message,
            attributes,
        })
    }

    pub fn msg_type(&self) -> u8 {
        match self {
            ServerMessage::ServerHandshake { .. } => msg_type::SERVER_HANDSHAKE,
            ServerMessage::ServerKeyData(_) => msg_type::SERVER_KEY_DATA,
            ServerMessage::ReadyForCommand(_) => msg_type::READY_FOR_COMMAND,
            ServerMessage::Authentication(_) => msg_type::AUTHENTICATION,
            ServerMessage::ErrorResponse(_) => msg_type::ERROR_RESPONSE,
            ServerMessage::Unknown(tag) => *tag,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::ServerHandshake { .. } => "ServerHandshake",
            ServerMessage::ServerKeyData(_) => "ServerKeyData",
            ServerMessage::ReadyForCommand(_) => "ReadyForCommand",
            ServerMessage::Authentication(_) => "Authentication",
            ServerMessage::ErrorResponse(_) => "ErrorResponse",
            ServerMessage::Unknown(_) => "Unknown",
        }
    }
}

/// Skip a `count:uint16` list of `key:uint16 | value:bytes` headers.
fn skip_headers(msg: &mut Message) -> Result<(), WireError> {
    let count = msg.pop_u16()?;
    for _ in 0..count {
        msg.pop_u16()?;
        msg.pop_bytes()?;
    }
    Ok(())
}
