//! In-Memory Backend
//!
//! Hash table holding every entry in memory. Used for the read-only mirror
//! of an on-disk store and for throwaway stores in tests.

use bytes::Bytes;
use chrono::Utc;
use hashbrown::HashMap;
use std::time::Instant;
use tracing::info;

use super::backend::{KvBackend, StoreInfo, StoreState, StoredEntry};
use super::disk::{DiskBackend, TABLE_NAME};
use crate::codec::ByteOrder;
use crate::error::{Error, Result};

/// Memory-resident backend
#[derive(Debug)]
pub struct MemoryBackend {
    table: HashMap<String, Bytes>,
    byte_order: ByteOrder,
    state: StoreState,
    schema: bool,
    info: Option<StoreInfo>,
}

impl MemoryBackend {
    /// Create an empty backend awaiting a bulk load
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            table: HashMap::new(),
            byte_order,
            state: StoreState::Uninitialized,
            schema: false,
            info: None,
        }
    }

    /// Copy every entry of a built on-disk store and index the copy.
    ///
    /// Runs in time linear in the store size; for multi-gigabyte stores this
    /// can take minutes.
    pub fn from_disk(disk: &DiskBackend) -> Result<Self> {
        let source = disk
            .info()
            .cloned()
            .ok_or_else(|| Error::storage("source store is not ready"))?;

        let start = Instant::now();
        let mut mirror = Self::new(source.byte_order);
        mirror.table.reserve(source.entries as usize);
        mirror.create_schema()?;
        let copied = mirror.put_many(&mut disk.scan()?)?;
        mirror.build_index(source.dimension)?;

        if copied != source.entries {
            return Err(Error::storage(format!(
                "mirror copied {} entries, source index lists {}",
                copied, source.entries
            )));
        }

        // The mirror describes the source build, not the copy
        mirror.info = Some(source);

        info!(
            entries = copied,
            elapsed = ?start.elapsed(),
            path = %disk.dir().display(),
            "Loaded in-memory mirror"
        );
        Ok(mirror)
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn state(&self) -> StoreState {
        self.state
    }

    fn create_schema(&mut self) -> Result<()> {
        if self.schema || self.state != StoreState::Uninitialized {
            return Err(Error::Schema(TABLE_NAME.to_string()));
        }
        self.schema = true;
        self.state = StoreState::Failed;
        Ok(())
    }

    fn put_many(&mut self, entries: &mut dyn Iterator<Item = Result<StoredEntry>>) -> Result<u64> {
        if !self.schema {
            return Err(Error::storage("table has not been created"));
        }

        let mut written = 0;
        for entry in entries {
            let entry = entry?;
            if self.table.contains_key(&entry.key) {
                return Err(Error::DuplicateKey(entry.key));
            }
            self.table.insert(entry.key, entry.value);
            written += 1;
        }
        Ok(written)
    }

    fn build_index(&mut self, dimension: u32) -> Result<StoreInfo> {
        if !self.schema {
            return Err(Error::storage("table has not been created"));
        }

        self.table.shrink_to_fit();
        let info = StoreInfo {
            entries: self.table.len() as u64,
            dimension,
            byte_order: self.byte_order,
            built_at: Utc::now(),
        };
        self.info = Some(info.clone());
        self.state = StoreState::Ready;
        Ok(info)
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        if self.state != StoreState::Ready {
            return Err(Error::storage("key index has not been built"));
        }
        Ok(self.table.get(key).cloned())
    }

    fn info(&self) -> Option<&StoreInfo> {
        self.info.as_ref()
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
