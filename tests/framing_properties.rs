//! Property-based tests for framing and the version gate.
//!
//! - Frames written by `WriteBuffer` are sliced back out by `ReadBuffer`
//!   regardless of how the byte stream is chunked
//! - Mixed fixed- and variable-width scalars decode to what was pushed
//! - Reads past the end of a window fail without consuming anything
//! - `finish` fails whenever bytes are left over
//! - Any server version other than 0.8 is refused and the transport closed

mod common;

use common::pipe;
use proptest::prelude::*;
use qail_edgedb::Value;
use qail_edgedb::protocol::{Message, ReadBuffer, Reader, WireError, WriteBuffer};
use qail_edgedb::{EdgeConfig, EdgeConnection, EdgeError};

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

fn frames_strategy() -> impl Strategy<Value = Vec<(u8, Vec<u8>)>> {
    prop::collection::vec((any::<u8>(), payload_strategy()), 1..8)
}

#[test]
fn prop_frames_survive_any_chunking() {
    proptest!(|(frames in frames_strategy(), chunk in 1usize..64)| {
        let mut writer = WriteBuffer::new();
        for (tag, payload) in &frames {
            writer.begin_message(*tag).unwrap();
            writer.push_bytes(payload).unwrap();
            writer.end_message().unwrap();
        }
        let wire = writer.take().unwrap();

        let mut reader = ReadBuffer::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            reader.extend(piece);
            while let Some(mut msg) = reader.next_message().unwrap() {
                let tag = msg.msg_type;
                let body = msg.pop_bytes().unwrap();
                msg.finish().unwrap();
                decoded.push((tag, body.to_vec()));
            }
        }

        prop_assert_eq!(decoded, frames);
        prop_assert_eq!(reader.pending(), 0);
    });
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i16>().prop_map(Value::Int16),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(Value::Int64),
        // NaN never compares equal, so floats stay in the finite range.
        (-1e30f32..1e30f32).prop_map(Value::Float32),
        (-1e300f64..1e300f64).prop_map(Value::Float64),
        any::<bool>().prop_map(Value::Bool),
        ".{0,32}".prop_map(Value::Str),
        payload_strategy().prop_map(|b| Value::Bytes(b.into())),
        any::<u128>().prop_map(|n| Value::Uuid(uuid::Uuid::from_u128(n))),
    ]
}

#[test]
fn prop_scalars_survive_framing() {
    let rows_strategy =
        prop::collection::vec(prop::collection::vec(value_strategy(), 0..12), 1..6);
    proptest!(|(rows in rows_strategy, chunk in 1usize..48)| {
        let mut writer = WriteBuffer::new();
        for row in &rows {
            writer.begin_message(b'D').unwrap();
            for value in row {
                value.scalar_type().encode(value, &mut writer).unwrap();
            }
            writer.end_message().unwrap();
        }
        let wire = writer.take().unwrap();

        let mut reader = ReadBuffer::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            reader.extend(piece);
            while let Some(mut msg) = reader.next_message().unwrap() {
                let row = &rows[decoded.len()];
                let mut values = Vec::with_capacity(row.len());
                for expected in row {
                    values.push(expected.scalar_type().decode(&mut msg).unwrap());
                }
                msg.finish().unwrap();
                decoded.push(values);
            }
        }

        prop_assert_eq!(decoded, rows);
        prop_assert_eq!(reader.pending(), 0);
    });
}

#[test]
fn prop_underrun_never_consumes() {
    proptest!(|(data in payload_strategy(), extra in 1usize..32)| {
        let mut reader = Reader::new(data.clone());
        let want = data.len() + extra;

        let err = reader.pop_slice(want).unwrap_err();
        prop_assert_eq!(err, WireError::Underrun { needed: want, remaining: data.len() });
        prop_assert_eq!(reader.remaining(), data.len());

        // A bytes field claiming more than is there fails the same way.
        let mut prefixed = (want as u32).to_be_bytes().to_vec();
        prefixed.extend_from_slice(&data);
        let mut reader = Reader::new(prefixed);
        prop_assert!(reader.pop_bytes().is_err());
        prop_assert_eq!(reader.remaining(), 4 + data.len());
    });
}

#[test]
fn prop_finish_requires_exact_consumption() {
    proptest!(|(tag in any::<u8>(), data in payload_strategy(), take in 0usize..256)| {
        let take = take.min(data.len());
        let mut msg = Message::new(tag, data.clone());
        msg.pop_slice(take).unwrap();

        let left = data.len() - take;
        match msg.finish() {
            Ok(()) => prop_assert_eq!(left, 0),
            Err(e) => {
                prop_assert_eq!(e, WireError::UnreadData { msg_type: tag, remaining: left });
            }
        }
    });
}

#[test]
fn prop_partial_frames_stay_buffered() {
    proptest!(|(tag in any::<u8>(), data in payload_strategy(), cut in 0usize..260)| {
        let mut writer = WriteBuffer::new();
        writer.begin_message(tag).unwrap();
        for b in &data {
            writer.push_u8(*b);
        }
        writer.end_message().unwrap();
        let wire = writer.take().unwrap();
        let cut = cut.min(wire.len() - 1);

        let mut reader = ReadBuffer::new();
        reader.extend(&wire[..cut]);
        prop_assert!(reader.next_message().unwrap().is_none());
        prop_assert_eq!(reader.pending(), cut);

        reader.extend(&wire[cut..]);
        let msg = reader.next_message().unwrap().unwrap();
        prop_assert_eq!(msg.msg_type, tag);
        prop_assert_eq!(msg.remaining(), data.len());
    });
}

fn other_version() -> impl Strategy<Value = (u16, u16)> {
    (any::<u16>(), any::<u16>()).prop_filter("not the supported version", |v| *v != (0, 8))
}

#[test]
fn prop_version_gate() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let config = EdgeConfig::for_user("edgedb");

    proptest!(ProptestConfig::with_cases(64), |((major, minor) in other_version())| {
        let result = runtime.block_on(async {
            let (client, mut server) = pipe();
            let script = tokio::spawn(async move {
                server.expect_client_handshake().await;
                server.send_server_handshake(major, minor).await;
                server.expect_eof().await;
            });
            let result = EdgeConnection::handshake(client, &config).await;
            script.await.unwrap();
            result
        });

        let refused = matches!(
            result,
            Err(EdgeError::UnsupportedVersion { major: m, minor: n }) if m == major && n == minor
        );
        prop_assert!(refused);
    });
}
