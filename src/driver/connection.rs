//! EdgeDB Connection
//!
//! Core connection struct and the handshake state machine.
//!
//! ```text
//! Start -> AwaitingServerHandshake -> AwaitingAuthOrReady -> Authenticating -> Ready
//!                     \___________________\________________________\_____ Failed
//! ```
//!
//! The client speaks exactly protocol 0.8. A server that counter-proposes any
//! other version gets the transport closed on it; there is no fallback.

use super::{EdgeError, EdgeResult, EdgeStream};
use crate::config::EdgeConfig;
use crate::protocol::{
    AuthError, Authentication, ClientMessage, KEY_DATA_SIZE, ProtocolVersion, ReadBuffer,
    SCRAM_SHA_256, ScramConversation, ServerMessage, TransactionState, WriteBuffer,
};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, warn};

/// Where a connection is in its startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Start,
    /// ClientHandshake sent; the server may counter-propose a version.
    AwaitingServerHandshake,
    /// Version settled; waiting for an auth challenge or ReadyForCommand.
    AwaitingAuthOrReady,
    /// Inside the SCRAM sub-exchange.
    Authenticating,
    /// Handshake complete.
    Ready,
    /// Terminal. The transport is not usable.
    Failed,
}

/// A single EdgeDB connection.
///
/// Generic over the transport so the handshake can run over any byte
/// stream; [`EdgeConnection::connect`] opens a real [`EdgeStream`].
pub struct EdgeConnection<S = EdgeStream> {
    pub(crate) stream: S,
    pub(crate) read_buf: ReadBuffer,
    pub(crate) write_buf: WriteBuffer,
    state: HandshakeState,
    protocol_version: Option<ProtocolVersion>,
    key_data: Option<[u8; KEY_DATA_SIZE]>,
    transaction_state: TransactionState,
}

impl EdgeConnection<EdgeStream> {
    /// Open the configured transport and run the handshake, bounded by
    /// `config.connect_timeout`.
    pub async fn connect(config: &EdgeConfig) -> EdgeResult<Self> {
        let attempt = async {
            let stream = EdgeStream::connect(config).await?;
            Self::handshake(stream, config).await
        };
        match timeout(config.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?config.connect_timeout, "connect timed out");
                Err(EdgeError::Timeout(config.connect_timeout))
            }
        }
    }
}

impl<S> EdgeConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an open transport. No bytes are exchanged until [`startup`](Self::startup).
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: ReadBuffer::new(),
            write_buf: WriteBuffer::new(),
            state: HandshakeState::Start,
            protocol_version: None,
            key_data: None,
            transaction_state: TransactionState::default(),
        }
    }

    /// Run the handshake over an already-open transport.
    pub async fn handshake(stream: S, config: &EdgeConfig) -> EdgeResult<Self> {
        let mut conn = Self::new(stream);
        conn.startup(config).await?;
        Ok(conn)
    }

    /// Run the handshake, giving up at `deadline`.
    pub async fn handshake_until(
        stream: S,
        config: &EdgeConfig,
        deadline: Instant,
    ) -> EdgeResult<Self> {
        let budget = deadline.saturating_duration_since(Instant::now());
        match timeout_at(deadline, Self::handshake(stream, config)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?budget, "handshake deadline expired");
                Err(EdgeError::Timeout(budget))
            }
        }
    }

    /// Run the handshake until it finishes or `cancel` resolves.
    pub async fn handshake_with_cancel<F>(
        stream: S,
        config: &EdgeConfig,
        cancel: F,
    ) -> EdgeResult<Self>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!("handshake cancelled");
                Err(EdgeError::Cancelled)
            }
            result = Self::handshake(stream, config) => result,
        }
    }

    /// Drive the handshake to `Ready`.
    ///
    /// Any failure leaves the connection in `Failed`.
    pub async fn startup(&mut self, config: &EdgeConfig) -> EdgeResult<()> {
        if self.state != HandshakeState::Start {
            return Err(EdgeError::InvalidState(self.state));
        }
        let result = self.run_handshake(config).await;
        if let Err(e) = &result {
            warn!(error = %e, state = ?self.state, "handshake failed");
            self.transition(HandshakeState::Failed);
        }
        result
    }

    async fn run_handshake(&mut self, config: &EdgeConfig) -> EdgeResult<()> {
        let params = config.handshake_params();
        self.send(ClientMessage::ClientHandshake {
            version: ProtocolVersion::CURRENT,
            params: &params,
        })
        .await?;
        self.transition(HandshakeState::AwaitingServerHandshake);

        loop {
            let msg = self.recv().await?;
            debug!(msg = msg.name(), state = ?self.state, "handshake message");

            match msg {
                ServerMessage::ServerHandshake { version, .. }
                    if self.state == HandshakeState::AwaitingServerHandshake =>
                {
                    if version != ProtocolVersion::CURRENT {
                        warn!(
                            server = %version,
                            client = %ProtocolVersion::CURRENT,
                            "protocol version mismatch"
                        );
                        if let Err(e) = self.stream.shutdown().await {
                            warn!(error = %e, "failed to close transport after version mismatch");
                        }
                        return Err(EdgeError::UnsupportedVersion {
                            major: version.major,
                            minor: version.minor,
                        });
                    }
                    self.protocol_version = Some(version);
                    self.transition(HandshakeState::AwaitingAuthOrReady);
                }
                ServerMessage::ServerKeyData(key) => {
                    self.key_data = Some(key);
                    self.transition(HandshakeState::AwaitingAuthOrReady);
                }
                ServerMessage::Authentication(Authentication::Ok) => {
                    self.transition(HandshakeState::AwaitingAuthOrReady);
                }
                ServerMessage::Authentication(Authentication::Sasl { methods }) => {
                    debug!(methods = methods.len(), "server requested SASL");
                    self.transition(HandshakeState::Authenticating);
                    self.authenticate(config).await?;
                    self.transition(HandshakeState::AwaitingAuthOrReady);
                }
                ServerMessage::Authentication(other) => {
                    return Err(AuthError::UnexpectedStatus(other.status()).into());
                }
                ServerMessage::ReadyForCommand(tx_state) => {
                    self.transaction_state = tx_state;
                    // No ServerHandshake means our proposal stood.
                    self.protocol_version.get_or_insert(ProtocolVersion::CURRENT);
                    self.transition(HandshakeState::Ready);
                    return Ok(());
                }
                ServerMessage::ErrorResponse(err) => return Err(EdgeError::Server(err)),
                other => return Err(self.unexpected(&other)),
            }
        }
    }

    /// SCRAM-SHA-256 sub-exchange. Returns once the server signature has
    /// been verified and the server sent Authentication OK.
    async fn authenticate(&mut self, config: &EdgeConfig) -> EdgeResult<()> {
        let password = config
            .password
            .as_deref()
            .ok_or(AuthError::MissingPassword)?;
        let mut scram = ScramConversation::new(&config.user, password);

        let client_first = scram.step("")?;
        self.send(ClientMessage::SaslInitialResponse {
            mechanism: SCRAM_SHA_256,
            data: &client_first,
        })
        .await?;

        let server_first = match self.recv().await? {
            ServerMessage::Authentication(Authentication::SaslContinue { data }) => data,
            ServerMessage::Authentication(other) => {
                return Err(AuthError::UnexpectedStatus(other.status()).into());
            }
            ServerMessage::ErrorResponse(err) => return Err(EdgeError::Server(err)),
            other => return Err(self.unexpected(&other)),
        };

        // PBKDF2 runs on the blocking pool so a deadline or cancellation
        // can still interrupt the handshake while it hashes.
        let (mut scram, client_final) = tokio::task::spawn_blocking(move || {
            let client_final = scram.step(&server_first);
            (scram, client_final)
        })
        .await
        .map_err(std::io::Error::other)?;
        let client_final = client_final?;
        self.send(ClientMessage::SaslResponse {
            data: &client_final,
        })
        .await?;

        loop {
            match self.recv().await? {
                ServerMessage::Authentication(Authentication::SaslFinal { data }) => {
                    scram.step(&data)?;
                    debug!("server signature verified");
                }
                ServerMessage::Authentication(Authentication::Ok) => {
                    if !scram.is_done() {
                        return Err(AuthError::Malformed(
                            "authentication completed without a server signature".into(),
                        )
                        .into());
                    }
                    return Ok(());
                }
                ServerMessage::Authentication(other) => {
                    return Err(AuthError::UnexpectedStatus(other.status()).into());
                }
                ServerMessage::ErrorResponse(err) => return Err(EdgeError::Server(err)),
                other => return Err(self.unexpected(&other)),
            }
        }
    }

    /// Gracefully close the connection by sending a Terminate message.
    pub async fn close(mut self) -> EdgeResult<()> {
        self.send(ClientMessage::Terminate).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    fn transition(&mut self, next: HandshakeState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "handshake state");
            self.state = next;
        }
    }

    fn unexpected(&self, msg: &ServerMessage) -> EdgeError {
        EdgeError::UnexpectedMessage {
            msg_type: msg.msg_type(),
            state: self.state,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    /// Negotiated protocol version, once settled.
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.protocol_version
    }

    /// Opaque key data from ServerKeyData, if the server sent any.
    pub fn key_data(&self) -> Option<&[u8; KEY_DATA_SIZE]> {
        self.key_data.as_ref()
    }

    /// Transaction state from the last ReadyForCommand.
    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }
}
