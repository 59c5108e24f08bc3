//! Core I/O operations for EdgeDB connection.
//!
//! This module provides low-level send/receive methods.

use super::{EdgeConnection, EdgeError, EdgeResult};
use crate::protocol::{ClientMessage, ServerMessage};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Reserve this much read space before each socket read.
const READ_RESERVE: usize = 8192;

impl<S> EdgeConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Encode a client message and write it out immediately.
    pub async fn send(&mut self, msg: ClientMessage<'_>) -> EdgeResult<()> {
        if let Err(e) = msg.encode(&mut self.write_buf) {
            self.write_buf.reset();
            return Err(e.into());
        }
        self.flush_write_buf().await
    }

    /// Flush the write buffer to the stream.
    pub(crate) async fn flush_write_buf(&mut self) -> EdgeResult<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let bytes = self.write_buf.take()?;
        trace!(len = bytes.len(), tag = %(bytes[0] as char), "send");
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receive the next server message.
    /// Loops until a complete frame is buffered.
    pub async fn recv(&mut self) -> EdgeResult<ServerMessage> {
        loop {
            if let Some(msg) = self.read_buf.next_message()? {
                trace!(tag = %(msg.msg_type as char), len = msg.remaining(), "recv");
                return Ok(ServerMessage::decode(msg)?);
            }

            let inner = self.read_buf.inner_mut();
            if inner.capacity() - inner.len() < READ_RESERVE {
                inner.reserve(READ_RESERVE);
            }

            let n = self.stream.read_buf(inner).await?;
            if n == 0 {
                return Err(EdgeError::ConnectionClosed);
            }
        }
    }
}
