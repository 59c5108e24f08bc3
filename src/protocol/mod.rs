//! EdgeDB Wire Protocol (Layer 2: Pure, Sync)
//!
//! No async, no I/O, no tokio - just frames ↔ bytes computation.

pub mod auth;
pub mod buffer;
pub mod error;
pub mod wire;

pub use auth::{AuthError, MAX_ITERATIONS, ScramConversation, ScramStep};
pub use buffer::{HEADER_SIZE, LENGTH_PREFIX_SIZE, Message, ReadBuffer, Reader, WriteBuffer};
pub use error::{ServerError, Severity, WireError};
pub use wire::*;
