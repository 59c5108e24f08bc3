//! Scripted in-memory EdgeDB server for driving the client handshake.
//!
//! The server side of each test is written as a straight-line script over
//! one end of a `tokio::io::duplex` pipe; the client runs on the other end.

#![allow(dead_code)]

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use qail_edgedb::protocol::{Message, WriteBuffer, auth_status, msg_type};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

type HmacSha256 = Hmac<Sha256>;

pub const PIPE_CAPACITY: usize = 4096;
pub const SERVER_NONCE_SUFFIX: &str = "3rfcNHYJY1ZVvWVs7j";
pub const SALT: &[u8] = b"edgedb-test-salt";
pub const ITERATIONS: u32 = 64;

/// Client end plus scripted server end of one in-memory connection.
pub fn pipe() -> (DuplexStream, ScriptedServer) {
    let (client, server) = duplex(PIPE_CAPACITY);
    (client, ScriptedServer { stream: server })
}

pub struct ScriptedServer {
    stream: DuplexStream,
}

impl ScriptedServer {
    /// Read one client frame.
    pub async fn read_message(&mut self) -> Message {
        let mut header = [0u8; 5];
        self.stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut payload = vec![0u8; len - 4];
        self.stream.read_exact(&mut payload).await.unwrap();
        Message::new(header[0], payload)
    }

    /// Read the ClientHandshake and return its parameters.
    pub async fn expect_client_handshake(&mut self) -> Vec<(String, String)> {
        let mut msg = self.read_message().await;
        assert_eq!(msg.msg_type, msg_type::CLIENT_HANDSHAKE);
        assert_eq!(msg.pop_u16().unwrap(), 0, "major version");
        assert_eq!(msg.pop_u16().unwrap(), 8, "minor version");

        let count = msg.pop_u16().unwrap();
        let mut params = Vec::new();
        for _ in 0..count {
            let name = msg.pop_string().unwrap();
            let value = msg.pop_string().unwrap();
            params.push((name, value));
        }
        assert_eq!(msg.pop_u16().unwrap(), 0, "extension count");
        msg.finish().unwrap();
        params
    }

    /// Returns the mechanism and client-first message.
    pub async fn expect_sasl_initial_response(&mut self) -> (String, String) {
        let mut msg = self.read_message().await;
        assert_eq!(msg.msg_type, msg_type::SASL_INITIAL_RESPONSE);
        let mechanism = msg.pop_string().unwrap();
        let data = msg.pop_string().unwrap();
        msg.finish().unwrap();
        (mechanism, data)
    }

    pub async fn expect_sasl_response(&mut self) -> String {
        let mut msg = self.read_message().await;
        assert_eq!(msg.msg_type, msg_type::SASL_RESPONSE);
        let data = msg.pop_string().unwrap();
        msg.finish().unwrap();
        data
    }

    /// Wait until the client closes its write half.
    pub async fn expect_eof(&mut self) {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "unexpected trailing bytes: {:?}", rest);
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    async fn send_frame(&mut self, tag: u8, body: impl FnOnce(&mut WriteBuffer)) {
        let mut buf = WriteBuffer::new();
        buf.begin_message(tag).unwrap();
        body(&mut buf);
        buf.end_message().unwrap();
        let frame: Bytes = buf.take().unwrap();
        self.send_raw(&frame).await;
    }

    pub async fn send_server_handshake(&mut self, major: u16, minor: u16) {
        self.send_frame(msg_type::SERVER_HANDSHAKE, |b| {
            b.push_u16(major);
            b.push_u16(minor);
            b.push_u16(0);
        })
        .await;
    }

    pub async fn send_key_data(&mut self, key: [u8; 32]) {
        self.send_frame(msg_type::SERVER_KEY_DATA, |b| {
            for byte in key {
                b.push_u8(byte);
            }
        })
        .await;
    }

    pub async fn send_auth_ok(&mut self) {
        self.send_frame(msg_type::AUTHENTICATION, |b| b.push_u32(auth_status::OK))
            .await;
    }

    pub async fn send_auth_sasl(&mut self, methods: &[&str]) {
        self.send_frame(msg_type::AUTHENTICATION, |b| {
            b.push_u32(auth_status::SASL);
            b.push_u32(methods.len() as u32);
            for m in methods {
                b.push_str(m).unwrap();
            }
        })
        .await;
    }

    pub async fn send_auth_continue(&mut self, data: &str) {
        self.send_frame(msg_type::AUTHENTICATION, |b| {
            b.push_u32(auth_status::SASL_CONTINUE);
            b.push_str(data).unwrap();
        })
        .await;
    }

    pub async fn send_auth_final(&mut self, data: &str) {
        self.send_frame(msg_type::AUTHENTICATION, |b| {
            b.push_u32(auth_status::SASL_FINAL);
            b.push_str(data).unwrap();
        })
        .await;
    }

    pub async fn send_ready(&mut self, tx_state: u8) {
        self.send_frame(msg_type::READY_FOR_COMMAND, |b| {
            b.push_u16(0);
            b.push_u8(tx_state);
        })
        .await;
    }

    pub async fn send_error(&mut self, severity: u8, code: u32, message: &str, hint: Option<&str>) {
        self.send_frame(msg_type::ERROR_RESPONSE, |b| {
            b.push_u8(severity);
            b.push_u32(code);
            b.push_str(message).unwrap();
            match hint {
                Some(hint) => {
                    b.push_u16(1);
                    b.push_u16(0x0001);
                    b.push_str(hint).unwrap();
                }
                None => b.push_u16(0),
            }
        })
        .await;
    }

    /// Play the server side of SCRAM-SHA-256 after the SASL method list has
    /// been sent. Returns the client-final message as received.
    ///
    /// With `tamper_signature` the server signature is corrupted.
    pub async fn scram_exchange(&mut self, password: &str, tamper_signature: bool) -> String {
        let (mechanism, client_first) = self.expect_sasl_initial_response().await;
        assert_eq!(mechanism, "SCRAM-SHA-256");

        let client_first_bare = client_first
            .strip_prefix("n,,")
            .expect("gs2 header without channel binding");
        let client_nonce = client_first_bare
            .split(',')
            .find_map(|p| p.strip_prefix("r="))
            .expect("client nonce");

        let nonce = format!("{}{}", client_nonce, SERVER_NONCE_SUFFIX);
        let server_first = format!("r={},s={},i={}", nonce, BASE64.encode(SALT), ITERATIONS);
        self.send_auth_continue(&server_first).await;

        let client_final = self.expect_sasl_response().await;
        let (without_proof, proof) = client_final.rsplit_once(",p=").expect("client proof");
        assert_eq!(without_proof, format!("c=biws,r={}", nonce));

        let mut salted = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), SALT, ITERATIONS, &mut salted);
        let auth_message = format!("{},{},{}", client_first_bare, server_first, without_proof);

        let client_key = hmac(&salted, b"Client Key");
        let stored_key = Sha256::digest(&client_key);
        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let expected_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();
        assert_eq!(BASE64.decode(proof).unwrap(), expected_proof, "client proof");

        let server_key = hmac(&salted, b"Server Key");
        let mut server_signature = hmac(&server_key, auth_message.as_bytes());
        if tamper_signature {
            server_signature[0] ^= 0xff;
        }
        self.send_auth_final(&format!("v={}", BASE64.encode(&server_signature)))
            .await;
        client_final
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
