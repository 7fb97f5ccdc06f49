//! Byte Order

use std::fmt;
use std::str::FromStr;

/// Byte order used for every float in a stored vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ByteOrder {
    #[default]
    BigEndian = 0,
    LittleEndian = 1,
}

impl ByteOrder {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ByteOrder::BigEndian),
            1 => Some(ByteOrder::LittleEndian),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::BigEndian => write!(f, "big"),
            ByteOrder::LittleEndian => write!(f, "little"),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "big" | "be" | "big-endian" => Ok(ByteOrder::BigEndian),
            "little" | "le" | "little-endian" => Ok(ByteOrder::LittleEndian),
            other => Err(format!("unknown byte order: {other} (expected `big` or `little`)")),
        }
    }
}
