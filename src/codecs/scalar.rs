//! Fixed- and variable-width scalar codec implementations.

use super::{ScalarCodec, Width};
use crate::protocol::buffer::UUID_SIZE;
use crate::protocol::{Reader, WireError, WriteBuffer};
use uuid::Uuid;

// ==================== Integer Types ====================

pub struct Int16Codec;

impl ScalarCodec for Int16Codec {
    type Value = i16;
    const WIDTH: Width = Width::Fixed(2);

    fn encode(value: &i16, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_i16(*value);
        Ok(())
    }

    fn decode(reader: &mut Reader) -> Result<i16, WireError> {
        reader.pop_i16()
    }
}

pub struct Int32Codec;

impl ScalarCodec for Int32Codec {
    type Value = i32;
    const WIDTH: Width = Width::Fixed(4);

    fn encode(value: &i32, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_i32(*value);
        Ok(())
    }

    fn decode(reader: &mut Reader) -> Result<i32, WireError> {
        reader.pop_i32()
    }
}

pub struct Int64Codec;

impl ScalarCodec for Int64Codec {
    type Value = i64;
    const WIDTH: Width = Width::Fixed(8);

    fn encode(value: &i64, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_i64(*value);
        Ok(())
    }

    fn decode(reader: &mut Reader) -> Result<i64, WireError> {
        reader.pop_i64()
    }
}

// ==================== Float Types ====================

/// IEEE 754 single precision, big-endian.
pub struct Float32Codec;

impl ScalarCodec for Float32Codec {
    type Value = f32;
    const WIDTH: Width = Width::Fixed(4);

    fn encode(value: &f32, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_f32(*value);
        Ok(())
    }

    fn decode(reader: &mut Reader) -> Result<f32, WireError> {
        reader.pop_f32()
    }
}

/// IEEE 754 double precision, big-endian.
pub struct Float64Codec;

impl ScalarCodec for Float64Codec {
    type Value = f64;
    const WIDTH: Width = Width::Fixed(8);

    fn encode(value: &f64, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_f64(*value);
        Ok(())
    }

    fn decode(reader: &mut Reader) -> Result<f64, WireError> {
        reader.pop_f64()
    }
}

// ==================== Boolean ====================

/// One byte; decodes any nonzero value as `true`.
pub struct BoolCodec;

impl ScalarCodec for BoolCodec {
    type Value = bool;
    const WIDTH: Width = Width::Fixed(1);

    fn encode(value: &bool, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_bool(*value);
        Ok(())
    }

    fn decode(reader: &mut Reader) -> Result<bool, WireError> {
        reader.pop_bool()
    }
}

// ==================== String / Bytes ====================

pub struct StrCodec;

impl ScalarCodec for StrCodec {
    type Value = String;
    const WIDTH: Width = Width::Variable;

    fn encode(value: &String, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_str(value)
    }

    fn decode(reader: &mut Reader) -> Result<String, WireError> {
        reader.pop_string()
    }
}

pub struct BytesCodec;

impl ScalarCodec for BytesCodec {
    type Value = bytes::Bytes;
    const WIDTH: Width = Width::Variable;

    fn encode(value: &bytes::Bytes, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_bytes(value)
    }

    fn decode(reader: &mut Reader) -> Result<bytes::Bytes, WireError> {
        reader.pop_bytes()
    }
}

// ==================== UUID ====================

/// 16 opaque bytes in wire order.
pub struct UuidCodec;

impl ScalarCodec for UuidCodec {
    type Value = Uuid;
    const WIDTH: Width = Width::Fixed(UUID_SIZE);

    fn encode(value: &Uuid, buf: &mut WriteBuffer) -> Result<(), WireError> {
        buf.push_uuid(value);
        Ok(())
    }

    fn decode(reader: &mut Reader) -> Result<Uuid, WireError> {
        reader.pop_uuid()
    }
}
