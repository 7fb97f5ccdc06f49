//! Vector Encoding
//!
//! Layout: `D` consecutive IEEE-754 single precision floats, no length
//! prefix and no padding. The blob length divided by 4 recovers `D`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::ByteOrder;
use crate::error::CodecError;

/// Size of one encoded element in bytes
pub const FLOAT_SIZE: usize = 4;

/// Encode a vector into its binary form
pub fn encode(vector: &[f32], order: ByteOrder) -> Bytes {
    let mut buf = BytesMut::with_capacity(vector.len() * FLOAT_SIZE);
    for &v in vector {
        match order {
            ByteOrder::BigEndian => buf.put_f32(v),
            ByteOrder::LittleEndian => buf.put_f32_le(v),
        }
    }
    buf.freeze()
}

/// Encode a parsed corpus vector, narrowing each element to `f32`
pub fn encode_f64(vector: &[f64], order: ByteOrder) -> Bytes {
    let mut buf = BytesMut::with_capacity(vector.len() * FLOAT_SIZE);
    for &v in vector {
        let v = v as f32;
        match order {
            ByteOrder::BigEndian => buf.put_f32(v),
            ByteOrder::LittleEndian => buf.put_f32_le(v),
        }
    }
    buf.freeze()
}

/// Decode a binary blob back into a vector
pub fn decode(mut data: &[u8], order: ByteOrder) -> Result<Vec<f32>, CodecError> {
    if data.len() % FLOAT_SIZE != 0 {
        return Err(CodecError::Truncated { len: data.len() });
    }

    let mut vec = Vec::with_capacity(data.len() / FLOAT_SIZE);
    while data.remaining() >= FLOAT_SIZE {
        let v = match order {
            ByteOrder::BigEndian => data.get_f32(),
            ByteOrder::LittleEndian => data.get_f32_le(),
        };
        vec.push(v);
    }
    Ok(vec)
}
