//! Storage Engine
//!
//! Key-value backends and the embedding store built on top of them.

mod backend;
mod disk;
mod memory;
mod store;

pub use backend::{KvBackend, StoreInfo, StoreState, StoredEntry};
pub use disk::{DiskBackend, TableScan, TABLE_NAME};
pub use memory::MemoryBackend;
pub use store::{Store, StoreKind};
