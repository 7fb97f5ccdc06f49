//! embkv - Persistent Word Embedding Store
//!
//! Exact-key lookup of fixed-dimension word vectors. A store is built once
//! from a fastText style `.vec` corpus and then queried many times, either
//! straight from disk or from an in-memory mirror.
//!
//! ```no_run
//! use embkv::Store;
//!
//! # fn main() -> embkv::Result<()> {
//! let mut store = Store::open("./data/wiki.en")?;
//! store.build_db(std::fs::File::open("wiki.en.vec")?)?;
//! store.close()?;
//!
//! let store = Store::open_in_memory("./data/wiki.en")?;
//! match store.get_emb("king") {
//!     Ok(vec) => println!("{:?}", vec),
//!     Err(e) if e.is_not_found() => println!("out of vocabulary"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod storage;

pub use codec::ByteOrder;
pub use config::StoreConfig;
pub use error::{CodecError, Error, FormatError, Result};
pub use ingest::{Ingestor, Record, SENTINEL_KEY};
pub use metrics::Metrics;
pub use storage::{DiskBackend, KvBackend, MemoryBackend, Store, StoreInfo, StoreKind, StoreState};
