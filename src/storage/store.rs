//! Embedding Store
//!
//! Session over a backend: one-shot bulk load from a corpus, then point
//! lookups of word vectors.
//!
//! A `Store` is a single session and is not meant to be shared between
//! threads. Concurrent readers should each open their own session on the
//! same path.

use std::fmt;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{KvBackend, StoreInfo, StoreState, StoredEntry};
use super::disk::{DiskBackend, TABLE_NAME};
use super::memory::MemoryBackend;
use crate::codec;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::metrics::{LookupOutcome, Metrics};

/// Where a store's entries live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// Persistent store in a directory
    Disk(PathBuf),
    /// In-memory copy of the persistent store in a directory
    Mirror(PathBuf),
    /// Non-persistent store
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Disk(path) => write!(f, "disk ({})", path.display()),
            StoreKind::Mirror(path) => write!(f, "in-memory mirror of {}", path.display()),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

/// Word embedding store session
pub struct Store {
    backend: Box<dyn KvBackend>,
    config: StoreConfig,
    kind: StoreKind,
    metrics: Metrics,
}

impl Store {
    /// Open (or create) the persistent store at `path` with default configuration
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StoreConfig::default())
    }

    /// Open (or create) the persistent store at `path`
    pub fn open_with<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let backend = DiskBackend::open(path, &config)?;
        if backend.state() == StoreState::Failed {
            warn!(
                path = %path.display(),
                "Store has a table but no index; a previous bulk load did not finish"
            );
        }
        Ok(Self::with_backend(
            Box::new(backend),
            config,
            StoreKind::Disk(path.to_path_buf()),
        ))
    }

    /// Load the persistent store at `path` fully into memory.
    ///
    /// Lookups no longer touch the disk afterwards. Loading is linear in the
    /// store size and can take minutes for large corpora.
    pub fn open_in_memory<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_in_memory_with(path, StoreConfig::default())
    }

    pub fn open_in_memory_with<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let disk = DiskBackend::open(path, &config)?;
        if disk.state() != StoreState::Ready {
            return Err(Error::storage(format!(
                "cannot mirror {}: store is {}",
                path.display(),
                disk.state()
            )));
        }

        let mirror = MemoryBackend::from_disk(&disk)?;
        Box::new(disk).close()?;

        Ok(Self::with_backend(
            Box::new(mirror),
            config,
            StoreKind::Mirror(path.to_path_buf()),
        ))
    }

    /// Create an empty, non-persistent store
    pub fn memory() -> Self {
        Self::memory_with(StoreConfig::default())
    }

    pub fn memory_with(config: StoreConfig) -> Self {
        let backend = MemoryBackend::new(config.byte_order);
        Self::with_backend(Box::new(backend), config, StoreKind::Memory)
    }

    /// Wrap an arbitrary backend
    pub fn with_backend(backend: Box<dyn KvBackend>, config: StoreConfig, kind: StoreKind) -> Self {
        Self {
            backend,
            config,
            kind,
            metrics: Metrics::new(),
        }
    }

    /// Populate the store from a corpus.
    ///
    /// Parsing runs on a producer thread feeding a bounded queue; this thread
    /// encodes and writes each record, and builds the key index once every
    /// record is written. Any failure aborts the whole load. Entries written
    /// before the failure are not rolled back and the store is left
    /// [`StoreState::Failed`].
    ///
    /// Fails with `Error::Schema` if the store was already populated, and
    /// with `Error::DuplicateKey` if the corpus repeats a word.
    pub fn build_db<R: Read + Send>(&mut self, corpus: R) -> Result<()> {
        if self.backend.state() != StoreState::Uninitialized {
            return Err(Error::Schema(TABLE_NAME.to_string()));
        }

        let start = Instant::now();
        match self.load(corpus) {
            Ok(info) => {
                info!(
                    entries = info.entries,
                    dimension = info.dimension,
                    elapsed = ?start.elapsed(),
                    "Bulk load complete"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, elapsed = ?start.elapsed(), "Bulk load aborted");
                Err(e)
            }
        }
    }

    fn load<R: Read + Send>(&mut self, corpus: R) -> Result<StoreInfo> {
        self.backend.create_schema()?;

        let ingestor = Ingestor::new(BufReader::new(corpus), self.config.queue_capacity)?;
        let header = ingestor.header();
        let dimension = u32::try_from(header.dimension).map_err(|_| {
            Error::storage(format!("dimension {} is too large", header.dimension))
        })?;

        info!(
            dimension,
            vocab = ?header.vocab_count,
            queue_capacity = ingestor.capacity(),
            kind = %self.kind,
            "Starting bulk load"
        );

        let order = self.config.byte_order;
        let every = self.config.progress_interval;
        let backend = &mut self.backend;

        let written = ingestor.run(|stream| {
            let mut seen = 0u64;
            let mut entries = stream.map(|item| {
                item.map(|record| {
                    seen += 1;
                    if every > 0 && seen % every == 0 {
                        debug!(records = seen, line = record.line, "Bulk load progress");
                    }
                    StoredEntry {
                        value: codec::encode_f64(&record.vector, order),
                        key: record.word,
                    }
                })
            });
            backend.put_many(&mut entries)
        })??;

        debug!(records = written, "All records written, building index");
        self.backend.build_index(dimension)
    }

    /// Look up the vector stored for `word`.
    ///
    /// Returns `Error::NotFound` for words that are not in the store.
    pub fn get_emb(&self, word: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = self.lookup(word);

        let outcome = match &result {
            Ok(_) => LookupOutcome::Hit,
            Err(Error::NotFound) => LookupOutcome::Miss,
            Err(_) => LookupOutcome::Error,
        };
        self.metrics.record_lookup(outcome, start.elapsed());
        result
    }

    fn lookup(&self, word: &str) -> Result<Vec<f32>> {
        let state = self.backend.state();
        if state != StoreState::Ready {
            return Err(Error::storage(format!(
                "store is {}, lookups need a ready store",
                state
            )));
        }

        let blob = self.backend.get(word)?.ok_or(Error::NotFound)?;
        Ok(codec::decode(&blob, self.config.byte_order)?)
    }

    /// Release the store. Consumes the session.
    pub fn close(self) -> Result<()> {
        debug!(kind = %self.kind, "{}", self.metrics.summary());
        self.backend.close()
    }

    pub fn state(&self) -> StoreState {
        self.backend.state()
    }

    /// Summary of the built store, `None` until it is ready
    pub fn info(&self) -> Option<&StoreInfo> {
        self.backend.info()
    }

    pub fn kind(&self) -> &StoreKind {
        &self.kind
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
