//! # qail-edgedb
//!
//! Client core for the EdgeDB binary protocol, version 0.8.
//!
//! ## Layers
//!
//! | Module       | Role                                                   |
//! |--------------|--------------------------------------------------------|
//! | [`protocol`] | Wire buffer, message codecs, SCRAM-SHA-256 (no I/O)    |
//! | [`codecs`]   | Scalar value codecs over the wire buffer               |
//! | [`driver`]   | Async transport and the connection handshake           |
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use qail_edgedb::{EdgeConfig, EdgeConnection};
//!
//! let config = EdgeConfig::for_user("edgedb").password("secret");
//! let conn = EdgeConnection::connect(&config).await?;
//! println!("ready, protocol {:?}", conn.protocol_version());
//! conn.close().await?;
//! ```

pub mod codecs;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod protocol;

pub use codecs::{ScalarCodec, ScalarType, Value};
pub use config::{EdgeConfig, TlsConfig, TlsSecurity};
pub use credentials::Credentials;
pub use driver::{EdgeConnection, EdgeError, EdgeResult, EdgeStream, HandshakeState};
pub use protocol::{ProtocolVersion, ServerError, TransactionState, WireError};
