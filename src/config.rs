//! Store Configuration

use crate::codec::ByteOrder;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Byte order of stored vectors. Must match the order the store was built with.
    pub byte_order: ByteOrder,

    /// Capacity of the queue between the corpus parser and the bulk writer
    pub queue_capacity: usize,

    /// Write buffer size for the on-disk data file, in bytes
    pub write_buffer_size: usize,

    /// Log bulk load progress every N records (0 = never)
    pub progress_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::BigEndian,
            queue_capacity: 1024,
            write_buffer_size: 1 << 20,
            progress_interval: 1_000_000,
        }
    }
}

impl StoreConfig {
    /// Set the vector byte order
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Set the ingest queue capacity (clamped to at least 1)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn with_progress_interval(mut self, every: u64) -> Self {
        self.progress_interval = every;
        self
    }
}
