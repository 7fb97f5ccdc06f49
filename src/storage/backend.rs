//! Backend Abstraction
//!
//! Minimal key-value surface a persistent store must provide for bulk load
//! and point lookup.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::codec::ByteOrder;
use crate::error::Result;

/// A key and its encoded vector
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub key: String,
    pub value: Bytes,
}

/// Summary of a built store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Number of stored entries
    pub entries: u64,
    /// Embedding dimension
    pub dimension: u32,
    /// Byte order of the stored vectors
    pub byte_order: ByteOrder,
    /// When the index was built
    pub built_at: DateTime<Utc>,
}

impl fmt::Display for StoreInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries={} dimension={} byte_order={} built_at={}",
            self.entries,
            self.dimension,
            self.byte_order,
            self.built_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Lifecycle state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No schema yet; a bulk load may run
    Uninitialized,
    /// Loaded and indexed; lookups allowed
    Ready,
    /// A bulk load started but did not finish. Discard and recreate.
    Failed,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreState::Uninitialized => write!(f, "uninitialized"),
            StoreState::Ready => write!(f, "ready"),
            StoreState::Failed => write!(f, "failed"),
        }
    }
}

/// Persistent key-value backend
///
/// A backend is populated exactly once: `create_schema`, then `put_many`,
/// then `build_index`. Keys are unique; a repeated key fails the load.
pub trait KvBackend: Send {
    /// State the backend was found in when opened, or reached since
    fn state(&self) -> StoreState;

    /// Create the table. Fails with `Error::Schema` if it already exists.
    fn create_schema(&mut self) -> Result<()>;

    /// Write entries in order until the iterator ends or yields an error.
    ///
    /// Returns the number of entries written. Entries written before a
    /// failure are kept.
    fn put_many(&mut self, entries: &mut dyn Iterator<Item = Result<StoredEntry>>) -> Result<u64>;

    /// Build the key index over everything written so far
    fn build_index(&mut self, dimension: u32) -> Result<StoreInfo>;

    /// Exact-match lookup
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Summary of the built store, `None` until indexed
    fn info(&self) -> Option<&StoreInfo>;

    /// Flush and release resources
    fn close(self: Box<Self>) -> Result<()>;
}
