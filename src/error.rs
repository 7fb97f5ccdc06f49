//! Error Types
//!
//! Every failure surfaces as a value; nothing in the library panics or exits
//! on bad input.

use std::io;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by store operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Schema error: table `{0}` already exists")]
    Schema(String),

    #[error("No embedding found for the given word")]
    NotFound,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Duplicate key during bulk load: {0:?}")]
    DuplicateKey(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for the out-of-vocabulary case, which callers usually handle inline
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    pub(crate) fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}

/// Malformed corpus input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("corpus is empty, expected a `<count> <dimension>` header line")]
    MissingHeader,

    #[error("invalid header line {header:?}: expected `<count> <dimension>`")]
    InvalidHeader { header: String },

    #[error(
        "embedding size mismatch at line {line}, word {word:?}: expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        line: u64,
        word: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid number {token:?} at line {line}, word {word:?}")]
    InvalidNumber {
        line: u64,
        word: String,
        token: String,
    },
}

/// Corrupt or malformed vector blob
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("blob length {len} is not a multiple of 4")]
    Truncated { len: usize },
}
