//! Vector Codec
//!
//! Fixed-width binary encoding for embedding vectors.

mod byte_order;
mod vector;

pub use byte_order::ByteOrder;
pub use vector::{decode, encode, encode_f64, FLOAT_SIZE};
