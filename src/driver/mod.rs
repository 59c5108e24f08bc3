//! EdgeDB Driver Module (Layer 3: Async I/O)
//!
//! Connection methods are split across modules:
//! - `connection.rs` - Core struct, handshake state machine, SCRAM sub-exchange
//! - `io.rs` - send, recv over the wire buffers
//! - `stream.rs` - TCP / TLS / Unix transport

mod connection;
mod io;
mod stream;

pub use connection::{EdgeConnection, HandshakeState};
pub use stream::EdgeStream;

use crate::protocol::{AuthError, ServerError, WireError};
use std::time::Duration;
use thiserror::Error;

/// Error type for EdgeDB driver operations.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing or decoding failure. The stream is out of sync.
    #[error("Protocol error: {0}")]
    Wire(#[from] WireError),

    /// Server insists on a protocol version this client does not speak.
    #[error("unsupported protocol version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// A message arrived that is not valid in the current state.
    #[error("unexpected message type: 0x{msg_type:x} (state: {state:?})")]
    UnexpectedMessage { msg_type: u8, state: HandshakeState },

    /// SCRAM exchange failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Server answered with an ErrorResponse.
    #[error("Server error: {0}")]
    Server(ServerError),

    /// Gave up waiting.
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    /// Caller cancelled the attempt.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Server closed the stream mid-exchange.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Operation not valid in the current handshake state.
    #[error("invalid handshake state: {0:?}")]
    InvalidState(HandshakeState),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

impl EdgeError {
    /// The structured server error, if the server said no.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            EdgeError::Server(err) => Some(err),
            _ => None,
        }
    }

    /// True for timeout and cancellation, as opposed to protocol failures.
    pub fn is_gave_up(&self) -> bool {
        matches!(self, EdgeError::Timeout(_) | EdgeError::Cancelled)
    }
}

/// Result type for EdgeDB operations.
pub type EdgeResult<T> = Result<T, EdgeError>;
