//! Stream abstraction for TCP, TLS, and Unix socket connections.

use super::{EdgeError, EdgeResult};
use crate::config::{EdgeConfig, TlsConfig, TlsSecurity};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

/// ALPN protocol id of the binary protocol.
const ALPN_EDGEDB_BINARY: &[u8] = b"edgedb-binary";

/// An EdgeDB connection stream (TCP, TLS, or Unix).
#[allow(clippy::large_enum_variant)]
pub enum EdgeStream {
    Tcp(TcpStream),
    Tls(TlsStream<TcpStream>),
    /// Unix domain socket connection
    #[cfg(unix)]
    Unix(UnixStream),
}

impl EdgeStream {
    /// Open the transport described by the config.
    pub async fn connect(config: &EdgeConfig) -> EdgeResult<Self> {
        #[cfg(unix)]
        if let Some(path) = &config.unix_socket {
            debug!(path = %path.display(), "connecting via unix socket");
            return Ok(EdgeStream::Unix(UnixStream::connect(path).await?));
        }

        debug!(host = %config.host, port = config.port, "connecting via tcp");
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
        // Disable Nagle's algorithm for lower latency
        tcp.set_nodelay(true)?;

        match &config.tls {
            Some(tls) => Ok(EdgeStream::Tls(connect_tls(tcp, &config.host, tls).await?)),
            None => Ok(EdgeStream::Tcp(tcp)),
        }
    }
}

async fn connect_tls(
    tcp: TcpStream,
    host: &str,
    tls: &TlsConfig,
) -> EdgeResult<TlsStream<TcpStream>> {
    match tls.security {
        TlsSecurity::Default | TlsSecurity::Strict => {}
        other => {
            return Err(EdgeError::Tls(format!(
                "tls_security={} is not supported by this client",
                other
            )));
        }
    }

    let mut root_cert_store = RootCertStore::empty();
    if let Some(ca_pem) = &tls.ca_pem {
        for cert in rustls_pemfile::certs(&mut ca_pem.as_slice()) {
            let cert = cert.map_err(|e| EdgeError::Tls(format!("invalid CA certificate: {}", e)))?;
            root_cert_store
                .add(cert)
                .map_err(|e| EdgeError::Tls(format!("invalid CA certificate: {}", e)))?;
        }
    } else {
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            let _ = root_cert_store.add(cert);
        }
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_EDGEDB_BINARY.to_vec()];

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| EdgeError::Tls("Invalid hostname for TLS".to_string()))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| EdgeError::Tls(format!("TLS handshake failed: {}", e)))
}

impl AsyncRead for EdgeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EdgeStream::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            EdgeStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            EdgeStream::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for EdgeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            EdgeStream::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            EdgeStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            EdgeStream::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EdgeStream::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            EdgeStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            EdgeStream::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EdgeStream::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            EdgeStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            EdgeStream::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
