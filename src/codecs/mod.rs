//! Scalar codecs for EdgeDB base types.
//!
//! Each codec is a zero-sized type implementing [`ScalarCodec`]: a pure
//! encode/decode pair over a [`WriteBuffer`] / [`Reader`] window. Codecs know
//! nothing about message boundaries and never touch bytes outside the window
//! they are given.
//!
//! [`ScalarType`] is the runtime counterpart: picked from a server type id,
//! it decodes into the [`Value`] tagged union.

mod scalar;

pub use scalar::{
    BoolCodec, BytesCodec, Float32Codec, Float64Codec, Int16Codec, Int32Codec, Int64Codec,
    StrCodec, UuidCodec,
};

use crate::protocol::{Reader, WireError, WriteBuffer};
use thiserror::Error;
use uuid::Uuid;

/// Encoded width of a codec's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// Always exactly this many bytes.
    Fixed(usize),
    /// 4-byte big-endian length prefix followed by that many bytes.
    Variable,
}

/// Binary encode/decode for one primitive wire type.
pub trait ScalarCodec {
    type Value;

    const WIDTH: Width;

    fn encode(value: &Self::Value, buf: &mut WriteBuffer) -> Result<(), WireError>;

    fn decode(reader: &mut Reader) -> Result<Self::Value, WireError>;
}

/// Error type for dynamic (`ScalarType`) encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The value variant does not belong to the codec's type.
    #[error("cannot encode {got} as {expected}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
}

/// A decoded scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Str(String),
    Bytes(bytes::Bytes),
    Uuid(Uuid),
}

impl Value {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Value::Int16(_) => ScalarType::Int16,
            Value::Int32(_) => ScalarType::Int32,
            Value::Int64(_) => ScalarType::Int64,
            Value::Float32(_) => ScalarType::Float32,
            Value::Float64(_) => ScalarType::Float64,
            Value::Bool(_) => ScalarType::Bool,
            Value::Str(_) => ScalarType::Str,
            Value::Bytes(_) => ScalarType::Bytes,
            Value::Uuid(_) => ScalarType::Uuid,
        }
    }
}

/// Base scalar types with a codec in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Uuid,
    Str,
    Bytes,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
}

impl ScalarType {
    pub const ALL: [ScalarType; 9] = [
        ScalarType::Uuid,
        ScalarType::Str,
        ScalarType::Bytes,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::Float32,
        ScalarType::Float64,
        ScalarType::Bool,
    ];

    /// Well-known descriptor id of the base type.
    pub fn type_id(self) -> Uuid {
        let low = match self {
            ScalarType::Uuid => 0x100,
            ScalarType::Str => 0x101,
            ScalarType::Bytes => 0x102,
            ScalarType::Int16 => 0x103,
            ScalarType::Int32 => 0x104,
            ScalarType::Int64 => 0x105,
            ScalarType::Float32 => 0x106,
            ScalarType::Float64 => 0x107,
            ScalarType::Bool => 0x109,
        };
        Uuid::from_u128(low)
    }

    /// Look up a base scalar by descriptor id.
    pub fn from_type_id(id: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.type_id() == *id)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Uuid => "std::uuid",
            ScalarType::Str => "std::str",
            ScalarType::Bytes => "std::bytes",
            ScalarType::Int16 => "std::int16",
            ScalarType::Int32 => "std::int32",
            ScalarType::Int64 => "std::int64",
            ScalarType::Float32 => "std::float32",
            ScalarType::Float64 => "std::float64",
            ScalarType::Bool => "std::bool",
        }
    }

    pub fn width(self) -> Width {
        match self {
            ScalarType::Uuid => UuidCodec::WIDTH,
            ScalarType::Str => StrCodec::WIDTH,
            ScalarType::Bytes => BytesCodec::WIDTH,
            ScalarType::Int16 => Int16Codec::WIDTH,
            ScalarType::Int32 => Int32Codec::WIDTH,
            ScalarType::Int64 => Int64Codec::WIDTH,
            ScalarType::Float32 => Float32Codec::WIDTH,
            ScalarType::Float64 => Float64Codec::WIDTH,
            ScalarType::Bool => BoolCodec::WIDTH,
        }
    }

    pub fn decode(self, reader: &mut Reader) -> Result<Value, WireError> {
        Ok(match self {
            ScalarType::Uuid => Value::Uuid(UuidCodec::decode(reader)?),
            ScalarType::Str => Value::Str(StrCodec::decode(reader)?),
            ScalarType::Bytes => Value::Bytes(BytesCodec::decode(reader)?),
            ScalarType::Int16 => Value::Int16(Int16Codec::decode(reader)?),
            ScalarType::Int32 => Value::Int32(Int32Codec::decode(reader)?),
            ScalarType::Int64 => Value::Int64(Int64Codec::decode(reader)?),
            ScalarType::Float32 => Value::Float32(Float32Codec::decode(reader)?),
            ScalarType::Float64 => Value::Float64(Float64Codec::decode(reader)?),
            ScalarType::Bool => Value::Bool(BoolCodec::decode(reader)?),
        })
    }

    pub fn encode(self, value: &Value, buf: &mut WriteBuffer) -> Result<(), CodecError> {
        match (self, value) {
            (ScalarType::Uuid, Value::Uuid(v)) => UuidCodec::encode(v, buf)?,
            (ScalarType::Str, Value::Str(v)) => StrCodec::encode(v, buf)?,
            (ScalarType::Bytes, Value::Bytes(v)) => BytesCodec::encode(v, buf)?,
            (ScalarType::Int16, Value::Int16(v)) => Int16Codec::encode(v, buf)?,
            (ScalarType::Int32, Value::Int32(v)) => Int32Codec::encode(v, buf)?,
            (ScalarType::Int64, Value::Int64(v)) => Int64Codec::encode(v, buf)?,
            (ScalarType::Float32, Value::Float32(v)) => Float32Codec::encode(v, buf)?,
            (ScalarType::Float64, Value::Float64(v)) => Float64Codec::encode(v, buf)?,
            (ScalarType::Bool, Value::Bool(v)) => BoolCodec::encode(v, buf)?,
            (expected, got) => {
                return Err(CodecError::TypeMismatch {
                    expected: expected.name(),
                    got: got.scalar_type().name(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_lookup() {
        let id = Uuid::parse_str("00000000-0000-0000-0000-000000000105").unwrap();
        assert_eq!(ScalarType::from_type_id(&id), Some(ScalarType::Int64));

        // 0x108 is std::decimal, which has no scalar codec here.
        assert_eq!(ScalarType::from_type_id(&Uuid::from_u128(0x108)), None);

        for t in ScalarType::ALL {
            assert_eq!(ScalarType::from_type_id(&t.type_id()), Some(t));
        }
    }

    #[test]
    fn test_dynamic_round_trip() {
        let values = vec![
            Value::Int16(-2),
            Value::Int32(1 << 20),
            Value::Int64(i64::MIN),
            Value::Float32(1.5),
            Value::Float64(-0.25),
            Value::Bool(true),
            Value::Str("héllo".into()),
            Value::Bytes(bytes::Bytes::from_static(b"\x00\x01")),
            Value::Uuid(Uuid::from_u128(0x0102_0304_0506_0708_0807_0605_0403_0201)),
        ];

        let mut buf = WriteBuffer::new();
        for v in &values {
            v.scalar_type().encode(v, &mut buf).unwrap();
        }

        let mut reader = Reader::new(buf.take().unwrap());
        for v in &values {
            assert_eq!(&v.scalar_type().decode(&mut reader).unwrap(), v);
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_encode_type_mismatch() {
        let mut buf = WriteBuffer::new();
        let err = ScalarType::Int32
            .encode(&Value::Str("1".into()), &mut buf)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch {
                expected: "std::int32",
                got: "std::str",
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_widths() {
        assert_eq!(ScalarType::Uuid.width(), Width::Fixed(16));
        assert_eq!(ScalarType::Bool.width(), Width::Fixed(1));
        assert_eq!(ScalarType::Str.width(), Width::Variable);
    }
}
