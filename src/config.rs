//! Connection configuration.

use crate::credentials::Credentials;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5656;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How strictly the server certificate is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsSecurity {
    /// Same as `Strict` for this client.
    #[default]
    Default,
    Strict,
    NoHostVerification,
    Insecure,
}

impl TlsSecurity {
    pub fn as_str(self) -> &'static str {
        match self {
            TlsSecurity::Default => "default",
            TlsSecurity::Strict => "strict",
            TlsSecurity::NoHostVerification => "no_host_verification",
            TlsSecurity::Insecure => "insecure",
        }
    }
}

impl fmt::Display for TlsSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsSecurity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(TlsSecurity::Default),
            "strict" => Ok(TlsSecurity::Strict),
            "no_host_verification" => Ok(TlsSecurity::NoHostVerification),
            "insecure" => Ok(TlsSecurity::Insecure),
            other => Err(format!("unknown tls_security value {:?}", other)),
        }
    }
}

/// TLS settings for a connection.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// PEM-encoded CA bundle. The platform store is used when unset.
    pub ca_pem: Option<Vec<u8>>,
    pub security: TlsSecurity,
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust only the given PEM certificates.
    pub fn ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_pem = Some(pem.into());
        self
    }

    pub fn security(mut self, security: TlsSecurity) -> Self {
        self.security = security;
        self
    }
}

/// Everything needed to open and authenticate one connection.
#[derive(Clone)]
pub struct EdgeConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    /// Password (optional for trust mode)
    pub password: Option<String>,
    /// Bound on transport connect plus handshake.
    pub connect_timeout: Duration,
    /// Plain TCP when `None`.
    pub tls: Option<TlsConfig>,
    /// Overrides host/port when set.
    pub unix_socket: Option<PathBuf>,
}

impl EdgeConfig {
    /// Create a new connection configuration.
    pub fn new(host: &str, port: u16, user: &str, database: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            database: database.to_string(),
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls: None,
            unix_socket: None,
        }
    }

    /// Local defaults; the database name follows the user name.
    pub fn for_user(user: &str) -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, user, user)
    }

    /// Set password for authentication.
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    /// Build a config from a credentials file's contents.
    ///
    /// TLS is enabled when the credentials carry a certificate or an
    /// explicit security mode.
    pub fn from_credentials(creds: &Credentials) -> Self {
        let database = creds.database.as_deref().unwrap_or(&creds.user);
        let mut config = Self::new(
            creds.host.as_deref().unwrap_or(DEFAULT_HOST),
            creds.port.unwrap_or(DEFAULT_PORT),
            &creds.user,
            database,
        );
        config.password = creds.password.clone();

        if creds.tls_cert_data.is_some() || creds.tls_security.is_some() {
            config.tls = Some(TlsConfig {
                ca_pem: creds.tls_cert_data.as_ref().map(|s| s.as_bytes().to_vec()),
                security: creds.tls_security.unwrap_or_default(),
            });
        }
        config
    }

    /// Connection parameters sent in the client handshake, in wire order.
    pub fn handshake_params(&self) -> [(&str, &str); 2] {
        [("database", self.database.as_str()), ("user", self.user.as_str())]
    }
}

impl fmt::Debug for EdgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("tls", &self.tls)
            .field("unix_socket", &self.unix_socket)
            .finish()
    }
}
