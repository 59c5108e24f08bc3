//! SCRAM-SHA-256 Authentication
//!
//! Client side of the SASL SCRAM-SHA-256 mechanism (RFC 5802, RFC 7677).
//! No channel binding. The conversation owns no I/O: the connection hands it
//! server strings and sends back whatever it produces.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// base64("n,,"), the GS2 header without channel binding.
const GS2_HEADER_B64: &str = "biws";
const NONCE_LEN: usize = 24;
const NONCE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest PBKDF2 iteration count a server may ask for.
pub const MAX_ITERATIONS: u32 = 1 << 20;

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Server asked for SCRAM but no password was configured.
    #[error("password required for SCRAM-SHA-256 authentication")]
    MissingPassword,

    /// Server sent an authentication status that is not valid at this step.
    #[error("unexpected authentication status: 0x{0:x}")]
    UnexpectedStatus(u32),

    /// A server message could not be parsed.
    #[error("malformed SCRAM server message: {0}")]
    Malformed(String),

    /// The server nonce does not extend the client nonce.
    #[error("server nonce doesn't contain client nonce")]
    NonceMismatch,

    /// The server reported an error inside the SCRAM exchange (`e=`).
    #[error("server rejected authentication: {0}")]
    Rejected(String),

    /// The server signature did not match. The server is not who it claims.
    #[error("server signature verification failed")]
    VerificationFailed,

    /// `step` was called after the conversation finished.
    #[error("SCRAM conversation already finished")]
    Finished,
}

/// Where the conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramStep {
    /// Nothing sent yet.
    Initial,
    /// Client-first sent, waiting for server-first.
    AwaitingServerFirst,
    /// Client-final sent, waiting for the server signature.
    AwaitingServerFinal,
    /// Server signature verified.
    Done,
}

/// SCRAM-SHA-256 client conversation.
pub struct ScramConversation {
    username: String,
    password: String,
    client_nonce: String,
    step: ScramStep,
    /// Salted password, kept for server signature verification.
    salted_password: Option<Vec<u8>>,
    /// client-first-bare + server-first + client-final-without-proof
    auth_message: Option<String>,
}

impl ScramConversation {
    pub fn new(username: &str, password: &str) -> Self {
        let mut rng = rand::rng();
        let nonce: String = (0..NONCE_LEN)
            .map(|_| NONCE_CHARS[rng.random_range(0..NONCE_CHARS.len())] as char)
            .collect();
        Self::with_nonce(username, password, &nonce)
    }

    fn with_nonce(username: &str, password: &str, nonce: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            client_nonce: nonce.to_string(),
            step: ScramStep::Initial,
            salted_password: None,
            auth_message: None,
        }
    }

    pub fn step_state(&self) -> ScramStep {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.step == ScramStep::Done
    }

    /// Advance the conversation with the next server string.
    ///
    /// - `Initial`: the input is ignored; returns client-first.
    /// - `AwaitingServerFirst`: input is server-first; returns client-final.
    /// - `AwaitingServerFinal`: input is server-final; returns an empty
    ///   string once the server signature checks out.
    pub fn step(&mut self, challenge: &str) -> Result<String, AuthError> {
        match self.step {
            ScramStep::Initial => Ok(self.client_first_message()),
            ScramStep::AwaitingServerFirst => self.process_server_first(challenge),
            ScramStep::AwaitingServerFinal => {
                self.verify_server_final(challenge)?;
                Ok(String::new())
            }
            ScramStep::Done => Err(AuthError::Finished),
        }
    }

    /// `n,,n=<user>,r=<nonce>`
    fn client_first_message(&mut self) -> String {
        self.step = ScramStep::AwaitingServerFirst;
        format!("n,,{}", self.client_first_message_bare())
    }

    fn client_first_message_bare(&self) -> String {
        format!("n={},r={}", escape_username(&self.username), self.client_nonce)
    }

    /// Server-first format: `r=<nonce>,s=<salt>,i=<iterations>`
    fn process_server_first(&mut self, server_first: &str) -> Result<String, AuthError> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in server_first.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                nonce = Some(value);
            } else if let Some(value) = part.strip_prefix("s=") {
                salt = Some(
                    BASE64
                        .decode(value)
                        .map_err(|_| AuthError::Malformed("invalid salt base64".into()))?,
                );
            } else if let Some(value) = part.strip_prefix("i=") {
                iterations = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| AuthError::Malformed("invalid iteration count".into()))?,
                );
            } else if part.starts_with("m=") {
                return Err(AuthError::Malformed("unsupported mandatory extension".into()));
            } else if let Some(value) = part.strip_prefix("e=") {
                return Err(AuthError::Rejected(value.to_string()));
            }
        }

        let nonce = nonce.ok_or_else(|| AuthError::Malformed("missing nonce".into()))?;
        let salt = salt.ok_or_else(|| AuthError::Malformed("missing salt".into()))?;
        let iterations =
            iterations.ok_or_else(|| AuthError::Malformed("missing iteration count".into()))?;
        if iterations == 0 {
            return Err(AuthError::Malformed("iteration count must be positive".into()));
        }
        if iterations > MAX_ITERATIONS {
            return Err(AuthError::Malformed(format!(
                "iteration count {} exceeds {}",
                iterations, MAX_ITERATIONS
            )));
        }

        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(AuthError::NonceMismatch);
        }

        let salted_password = self.derive_salted_password(&salt, iterations);
        let client_key = hmac(&salted_password, b"Client Key")?;
        let stored_key = Sha256::digest(&client_key);

        let client_final_without_proof = format!("c={},r={}", GS2_HEADER_B64, nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_message_bare(),
            server_first,
            client_final_without_proof
        );

        let client_signature = hmac(&stored_key, auth_message.as_bytes())?;
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        self.salted_password = Some(salted_password);
        self.auth_message = Some(auth_message);
        self.step = ScramStep::AwaitingServerFinal;

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(&client_proof)
        ))
    }

    /// Server-final format: `v=<signature>` or `e=<error>`
    fn verify_server_final(&mut self, server_final: &str) -> Result<(), AuthError> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(AuthError::Rejected(err.to_string()));
        }

        let verifier = server_final
            .split(',')
            .find_map(|part| part.strip_prefix("v="))
            .ok_or_else(|| AuthError::Malformed("missing verifier".into()))?;
        let expected = BASE64
            .decode(verifier)
            .map_err(|_| AuthError::Malformed("invalid signature base64".into()))?;

        let (Some(salted_password), Some(auth_message)) =
            (self.salted_password.as_ref(), self.auth_message.as_ref())
        else {
            return Err(AuthError::Finished);
        };

        let server_key = hmac(salted_password, b"Server Key")?;
        let mut mac = HmacSha256::new_from_slice(&server_key)
            .map_err(|_| AuthError::Malformed("invalid server key".into()))?;
        mac.update(auth_message.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| AuthError::VerificationFailed)?;

        self.step = ScramStep::Done;
        Ok(())
    }

    /// PBKDF2-HMAC-SHA256 over the password.
    fn derive_salted_password(&self, salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut output = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.password.as_bytes(), salt, iterations, &mut output);
        output.to_vec()
    }
}

impl std::fmt::Debug for ScramConversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramConversation")
            .field("username", &self.username)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| AuthError::Malformed("invalid HMAC key".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 5802 `saslname`: `,` and `=` are escaped.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}
