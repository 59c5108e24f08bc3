//! Credentials file loading.
//!
//! A credentials file is a JSON object written by the server tooling:
//!
//! ```json
//! {"host": "localhost", "port": 10700, "user": "edgedb", "password": "..."}
//! ```

use crate::config::TlsSecurity;
use crate::driver::{EdgeError, EdgeResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a credentials document was rejected.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("credentials must be a JSON object")]
    NotAnObject,

    #[error("{0}")]
    Invalid(String),
}

/// Validated contents of a credentials file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_security: Option<TlsSecurity>,
}

impl Credentials {
    /// Where the credentials of a named instance live:
    /// `<config dir>/edgedb/credentials/<name>.json`.
    pub fn instance_file(name: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join("edgedb")
                .join("credentials")
                .join(format!("{}.json", name))
        })
    }

    /// Read and validate a credentials file.
    pub fn from_file(path: impl AsRef<Path>) -> EdgeResult<Self> {
        let path = path.as_ref();
        std::fs::read_to_string(path)
            .map_err(CredentialsError::from)
            .and_then(|data| Self::from_json(&data))
            .map_err(|e| {
                EdgeError::Config(format!(
                    "cannot read credentials at {:?}: {}",
                    path.display().to_string(),
                    e
                ))
            })
    }

    /// Parse and validate a credentials document.
    pub fn from_json(data: &str) -> Result<Self, CredentialsError> {
        match serde_json::from_str::<Value>(data)? {
            Value::Object(map) => Self::validate(&map),
            _ => Err(CredentialsError::NotAnObject),
        }
    }

    fn validate(data: &Map<String, Value>) -> Result<Self, CredentialsError> {
        let mut creds = Credentials::default();

        if let Some(val) = data.get("port") {
            // JSON numbers are accepted in float form as long as they are whole.
            let port = val
                .as_f64()
                .filter(|p| p.fract() == 0.0 && (1.0..=f64::from(u16::MAX)).contains(p))
                .map(|p| p as u16)
                .ok_or_else(|| invalid("invalid `port` value"))?;
            creds.port = Some(port);
        }

        creds.user = match data.get("user") {
            Some(Value::String(user)) => user.clone(),
            Some(_) => return Err(invalid("`user` must be a string")),
            None => return Err(invalid("`user` key is required")),
        };

        // An empty host means "use the default".
        creds.host = optional_string(data, "host")?.filter(|h| !h.is_empty());
        creds.database = optional_string(data, "database")?;
        creds.password = optional_string(data, "password")?;
        creds.tls_cert_data = optional_string(data, "tls_cert_data")?;

        let verify_hostname = match data.get("tls_verify_hostname") {
            Some(Value::Bool(v)) => Some(*v),
            Some(_) => return Err(invalid("`tls_verify_hostname` must be a boolean")),
            None => None,
        };
        if let Some(verify) = verify_hostname {
            creds.tls_security = Some(if verify {
                TlsSecurity::Strict
            } else {
                TlsSecurity::NoHostVerification
            });
        }

        if let Some(raw) = optional_string(data, "tls_security")? {
            let security: TlsSecurity = raw.parse().map_err(CredentialsError::Invalid)?;
            if let Some(verify) = verify_hostname {
                let incompatible = match security {
                    TlsSecurity::Insecure | TlsSecurity::NoHostVerification => verify,
                    TlsSecurity::Strict => !verify,
                    TlsSecurity::Default => false,
                };
                if incompatible {
                    return Err(invalid(format!(
                        "values tls_verify_hostname={} and tls_security={:?} are incompatible",
                        verify, raw
                    )));
                }
            }
            creds.tls_security = Some(security);
        }

        Ok(creds)
    }

    /// Serialize back to the on-disk JSON form.
    pub fn to_json(&self) -> Result<String, CredentialsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn invalid(msg: impl Into<String>) -> CredentialsError {
    CredentialsError::Invalid(msg.into())
}

fn optional_string(
    data: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, CredentialsError> {
    match data.get(key) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(format!("`{}` must be a string", key))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(json: &str) -> String {
        Credentials::from_json(json).unwrap_err().to_string()
    }

    #[test]
    fn test_minimal() {
        let creds = Credentials::from_json(r#"{"user": "edgedb"}"#).unwrap();
        assert_eq!(
            creds,
            Credentials {
                user: "edgedb".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_full() {
        let creds = Credentials::from_json(
            r#"{
                "host": "db.example.com",
                "port": 10700,
                "user": "admin",
                "database": "main",
                "password": "secret",
                "tls_cert_data": "-----BEGIN CERTIFICATE-----",
                "tls_verify_hostname": true
            }"#,
        )
        .unwrap();
        assert_eq!(creds.host.as_deref(), Some("db.example.com"));
        assert_eq!(creds.port, Some(10700));
        assert_eq!(creds.database.as_deref(), Some("main"));
        assert_eq!(creds.tls_security, Some(TlsSecurity::Strict));
    }

    #[test]
    fn test_user_required() {
        assert_eq!(reason(r#"{"port": 1}"#), "`user` key is required");
        assert_eq!(reason(r#"{"user": 5}"#), "`user` must be a string");
    }

    #[test]
    fn test_port_validation() {
        for bad in ["0", "65536", "-1", "1.5", "\"5656\""] {
            let json = format!(r#"{{"user": "u", "port": {}}}"#, bad);
            assert_eq!(reason(&json), "invalid `port` value", "port {}", bad);
        }
        let creds = Credentials::from_json(r#"{"user": "u", "port": 65535}"#).unwrap();
        assert_eq!(creds.port, Some(65535));
        let creds = Credentials::from_json(r#"{"user": "u", "port": 10700.0}"#).unwrap();
        assert_eq!(creds.port, Some(10700));
    }

    #[test]
    fn test_empty_host_ignored() {
        let creds = Credentials::from_json(r#"{"user": "u", "host": ""}"#).unwrap();
        assert_eq!(creds.host, None);
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(
            reason(r#"{"user": "u", "password": 1}"#),
            "`password` must be a string"
        );
        assert_eq!(
            reason(r#"{"user": "u", "tls_verify_hostname": "yes"}"#),
            "`tls_verify_hostname` must be a boolean"
        );
        assert_eq!(reason("[1, 2]"), "credentials must be a JSON object");
    }

    #[test]
    fn test_verify_hostname_mapping() {
        let creds =
            Credentials::from_json(r#"{"user": "u", "tls_verify_hostname": false}"#).unwrap();
        assert_eq!(creds.tls_security, Some(TlsSecurity::NoHostVerification));
    }

    #[test]
    fn test_incompatible_tls_options() {
        assert_eq!(
            reason(r#"{"user": "u", "tls_verify_hostname": true, "tls_security": "insecure"}"#),
            r#"values tls_verify_hostname=true and tls_security="insecure" are incompatible"#
        );
        assert!(Credentials::from_json(
            r#"{"user": "u", "tls_verify_hostname": false, "tls_security": "strict"}"#
        )
        .is_err());
        let creds = Credentials::from_json(
            r#"{"user": "u", "tls_verify_hostname": false, "tls_security": "insecure"}"#,
        )
        .unwrap();
        assert_eq!(creds.tls_security, Some(TlsSecurity::Insecure));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Credentials::from_file("/nonexistent/creds.json").unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains(r#"cannot read credentials at "/nonexistent/creds.json": "#),
            "{}",
            msg
        );
    }

    #[test]
    fn test_instance_file() {
        if let Some(path) = Credentials::instance_file("my_instance") {
            assert!(path.ends_with("edgedb/credentials/my_instance.json"));
        }
    }

    #[test]
    fn test_to_json_skips_unset() {
        let creds = Credentials {
            user: "u".into(),
            port: Some(10700),
            tls_security: Some(TlsSecurity::NoHostVerification),
            ..Default::default()
        };
        let json = creds.to_json().unwrap();
        assert!(!json.contains("\"host\""));
        assert!(json.contains("no_host_verification"));
        let back = Credentials::from_json(&json).unwrap();
        assert_eq!(back, creds);
    }
}
