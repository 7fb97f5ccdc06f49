//! On-Disk Backend
//!
//! Flat-file table plus a sorted offset index, both under one directory.
//!
//! Data file format (`fasttext.dat`):
//! - Magic: 4 bytes "EMKD"
//! - Version: 1 byte
//! - Byte order: 1 byte (0 = big, 1 = little)
//! - Entries: [key_len (4) + key + emb_len (4) + emb]*
//!
//! Index file format (`fasttext.idx`), written once after the bulk load:
//! - Magic: 4 bytes "EMKI"
//! - Version: 1 byte
//! - Reserved: 3 bytes
//! - Entry count: 8 bytes
//! - Dimension: 4 bytes
//! - Built at: 8 bytes (unix millis)
//! - Offsets: [data file offset (8)]* sorted by key bytes
//!
//! All integers are little-endian. Lookups binary-search the offset table,
//! so each query costs O(log n) seeks and nothing but the file handles is
//! held in memory.
//!
//! During a bulk load the writer keeps every key with its data offset until
//! the index is built, so load-time memory grows with the vocabulary size.
//! Length prefixes read back from the data file are checked against the file
//! size (and the table dimension for values) before anything is allocated.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::backend::{KvBackend, StoreInfo, StoreState, StoredEntry};
use crate::codec::{ByteOrder, FLOAT_SIZE};
use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Name of the embedding table
pub const TABLE_NAME: &str = "fasttext";

const DATA_MAGIC: &[u8; 4] = b"EMKD";
const INDEX_MAGIC: &[u8; 4] = b"EMKI";
const FORMAT_VERSION: u8 = 1;

const DATA_HEADER_SIZE: u64 = 6;
const INDEX_HEADER_SIZE: u64 = 28;
const OFFSET_SIZE: u64 = 8;

/// Flat-file backend rooted at a directory
pub struct DiskBackend {
    dir: PathBuf,
    byte_order: ByteOrder,
    write_buffer_size: usize,
    state: StoreState,
    writer: Option<TableWriter>,
    reader: Option<Mutex<TableReader>>,
    info: Option<StoreInfo>,
}

/// Open bulk-load session
struct TableWriter {
    out: BufWriter<File>,
    offset: u64,
    /// key -> data file offset; enforces uniqueness during the load.
    /// Holds one entry per loaded key until `build_index` sorts it to disk.
    keys: HashMap<String, u64>,
}

impl TableWriter {
    fn append(&mut self, entry: StoredEntry) -> Result<()> {
        if self.keys.contains_key(&entry.key) {
            return Err(Error::DuplicateKey(entry.key));
        }

        let key_len = len_u32(entry.key.len())?;
        let value_len = len_u32(entry.value.len())?;

        self.out.write_all(&key_len.to_le_bytes())?;
        self.out.write_all(entry.key.as_bytes())?;
        self.out.write_all(&value_len.to_le_bytes())?;
        self.out.write_all(&entry.value)?;

        self.keys.insert(entry.key, self.offset);
        self.offset += 8 + key_len as u64 + value_len as u64;
        Ok(())
    }
}

/// Lookup handles over a built table
struct TableReader {
    data: File,
    index: File,
    count: u64,
    data_len: u64,
    /// Stored embedding size in bytes (`4 * dimension`)
    value_len: u64,
}

impl TableReader {
    fn find(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        let (mut lo, mut hi) = (0, self.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let offset = self.offset_at(mid)?;
            self.data.seek(SeekFrom::Start(offset))?;
            let stored = read_blob(&mut self.data, self.data_len.saturating_sub(offset))?;

            match stored.as_slice().cmp(key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => {
                    let value = read_blob(&mut self.data, self.value_len)?;
                    if value.len() as u64 != self.value_len {
                        return Err(Error::storage(format!(
                            "stored embedding for {:?} is {} bytes, expected {}",
                            String::from_utf8_lossy(key),
                            value.len(),
                            self.value_len
                        )));
                    }
                    return Ok(Some(Bytes::from(value)));
                }
            }
        }
        Ok(None)
    }

    fn offset_at(&mut self, slot: u64) -> Result<u64> {
        self.index
            .seek(SeekFrom::Start(INDEX_HEADER_SIZE + slot * OFFSET_SIZE))?;
        Ok(read_u64(&mut self.index)?)
    }
}

impl DiskBackend {
    /// Open the store directory, creating it if needed.
    ///
    /// The state is derived from the files present: no data file means
    /// uninitialized, data plus index means ready, data alone means a
    /// previous load did not finish.
    pub fn open<P: AsRef<Path>>(dir: P, config: &StoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut backend = Self {
            dir,
            byte_order: config.byte_order,
            write_buffer_size: config.write_buffer_size,
            state: StoreState::Uninitialized,
            writer: None,
            reader: None,
            info: None,
        };

        let data_path = backend.data_path();
        if !data_path.exists() {
            return Ok(backend);
        }

        let mut data = File::open(&data_path)?;
        let stored_order = read_data_header(&mut data)?;
        if stored_order != backend.byte_order {
            return Err(Error::storage(format!(
                "byte order mismatch: {} was built {}-endian, config expects {}-endian",
                backend.dir.display(),
                stored_order,
                backend.byte_order
            )));
        }

        let index_path = backend.index_path();
        if !index_path.exists() {
            backend.state = StoreState::Failed;
            return Ok(backend);
        }

        let mut index = File::open(&index_path)?;
        let (count, dimension, built_at) = read_index_header(&mut index)?;
        let expected_len = INDEX_HEADER_SIZE + count * OFFSET_SIZE;
        let actual_len = index.metadata()?.len();
        if actual_len != expected_len {
            return Err(Error::storage(format!(
                "index file truncated: expected {} bytes, got {}",
                expected_len, actual_len
            )));
        }

        backend.info = Some(StoreInfo {
            entries: count,
            dimension,
            byte_order: stored_order,
            built_at,
        });
        let data_len = data.metadata()?.len();
        backend.reader = Some(Mutex::new(TableReader {
            data,
            index,
            count,
            data_len,
            value_len: embedding_len(dimension),
        }));
        backend.state = StoreState::Ready;

        debug!(path = %backend.dir.display(), entries = count, "Opened store");
        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}.dat", TABLE_NAME))
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(format!("{}.idx", TABLE_NAME))
    }

    /// Keys buffered by an open bulk load, waiting for `build_index`
    pub fn pending_keys(&self) -> usize {
        self.writer.as_ref().map_or(0, |writer| writer.keys.len())
    }

    /// Sequential scan over every entry of a built table, in load order
    pub fn scan(&self) -> Result<TableScan> {
        let info = self
            .info
            .as_ref()
            .ok_or_else(|| Error::storage("cannot scan a store that is not ready"))?;

        let data = File::open(self.data_path())?;
        let data_len = data.metadata()?.len();
        let mut reader = BufReader::new(data);
        reader.seek(SeekFrom::Start(DATA_HEADER_SIZE))?;

        Ok(TableScan {
            reader,
            remaining: info.entries,
            data_len,
        })
    }

    fn write_index(&self, mut keys: Vec<(String, u64)>, dimension: u32) -> Result<DateTime<Utc>> {
        keys.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let built_at_ms = Utc::now().timestamp_millis();
        let tmp_path = self.dir.join(format!("{}.idx.tmp", TABLE_NAME));
        let mut out = BufWriter::new(File::create(&tmp_path)?);

        out.write_all(INDEX_MAGIC)?;
        out.write_all(&[FORMAT_VERSION, 0, 0, 0])?;
        out.write_all(&(keys.len() as u64).to_le_bytes())?;
        out.write_all(&dimension.to_le_bytes())?;
        out.write_all(&built_at_ms.to_le_bytes())?;
        for (_, offset) in &keys {
            out.write_all(&offset.to_le_bytes())?;
        }

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp_path, self.index_path())?;

        millis_to_datetime(built_at_ms)
    }
}

impl KvBackend for DiskBackend {
    fn state(&self) -> StoreState {
        self.state
    }

    fn create_schema(&mut self) -> Result<()> {
        if self.state != StoreState::Uninitialized {
            return Err(Error::Schema(TABLE_NAME.to_string()));
        }

        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.data_path())
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::Schema(TABLE_NAME.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut out = BufWriter::with_capacity(self.write_buffer_size.max(8 * 1024), file);
        out.write_all(DATA_MAGIC)?;
        out.write_all(&[FORMAT_VERSION, self.byte_order.as_u8()])?;
        out.flush()?;

        // Not ready until the index exists
        self.state = StoreState::Failed;
        self.writer = Some(TableWriter {
            out,
            offset: DATA_HEADER_SIZE,
            keys: HashMap::new(),
        });

        debug!(path = %self.data_path().display(), "Created table");
        Ok(())
    }

    fn put_many(&mut self, entries: &mut dyn Iterator<Item = Result<StoredEntry>>) -> Result<u64> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::storage("table has not been created"))?;

        let mut written = 0;
        for entry in entries {
            if let Err(e) = entry.and_then(|entry| writer.append(entry)) {
                // Rows written before the failure stay on disk
                if let Err(flush_err) = writer.out.flush() {
                    warn!(error = %flush_err, "Failed to flush table after aborted load");
                }
                return Err(e);
            }
            written += 1;
        }

        writer.out.flush()?;
        Ok(written)
    }

    fn build_index(&mut self, dimension: u32) -> Result<StoreInfo> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| Error::storage("table has not been created"))?;

        let data = writer.out.into_inner().map_err(|e| e.into_error())?;
        data.sync_all()?;

        let keys: Vec<(String, u64)> = writer.keys.into_iter().collect();
        let count = keys.len() as u64;
        let built_at = self.write_index(keys, dimension)?;

        let info = StoreInfo {
            entries: count,
            dimension,
            byte_order: self.byte_order,
            built_at,
        };

        let data = File::open(self.data_path())?;
        let data_len = data.metadata()?.len();
        self.reader = Some(Mutex::new(TableReader {
            data,
            index: File::open(self.index_path())?,
            count,
            data_len,
            value_len: embedding_len(dimension),
        }));
        self.info = Some(info.clone());
        self.state = StoreState::Ready;

        info!(entries = count, path = %self.index_path().display(), "Built key index");
        Ok(info)
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| Error::storage("key index has not been built"))?;
        reader.lock().find(key.as_bytes())
    }

    fn info(&self) -> Option<&StoreInfo> {
        self.info.as_ref()
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.out.flush()?;
        }
        self.reader = None;
        debug!(path = %self.dir.display(), "Closed store");
        Ok(())
    }
}

/// Sequential reader over a built data file
pub struct TableScan {
    reader: BufReader<File>,
    remaining: u64,
    data_len: u64,
}

impl TableScan {
    fn read_entry(&mut self) -> Result<StoredEntry> {
        let key = String::from_utf8(read_blob(&mut self.reader, self.data_len)?)
            .map_err(|_| Error::storage("stored key is not valid UTF-8"))?;
        let value = Bytes::from(read_blob(&mut self.reader, self.data_len)?);
        Ok(StoredEntry { key, value })
    }
}

impl Iterator for TableScan {
    type Item = Result<StoredEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let entry = self.read_entry();
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }
}

fn read_data_header(r: &mut impl Read) -> Result<ByteOrder> {
    let mut header = [0u8; DATA_HEADER_SIZE as usize];
    r.read_exact(&mut header)?;

    if &header[..4] != DATA_MAGIC {
        return Err(Error::storage("invalid data file magic"));
    }
    if header[4] != FORMAT_VERSION {
        return Err(Error::storage(format!(
            "unsupported data file version: {}",
            header[4]
        )));
    }
    ByteOrder::from_u8(header[5])
        .ok_or_else(|| Error::storage(format!("invalid byte order tag: {}", header[5])))
}

fn read_index_header(r: &mut impl Read) -> Result<(u64, u32, DateTime<Utc>)> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != INDEX_MAGIC {
        return Err(Error::storage("invalid index file magic"));
    }

    let mut version = [0u8; 4];
    r.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(Error::storage(format!(
            "unsupported index file version: {}",
            version[0]
        )));
    }

    let count = read_u64(r)?;
    let mut dim_buf = [0u8; 4];
    r.read_exact(&mut dim_buf)?;
    let dimension = u32::from_le_bytes(dim_buf);
    let built_at = millis_to_datetime(read_u64(r)? as i64)?;

    Ok((count, dimension, built_at))
}

fn read_u64(r: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read one length-prefixed blob, rejecting lengths above `max_len`
fn read_blob(r: &mut impl Read, max_len: u64) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as u64;
    if len > max_len {
        return Err(Error::storage(format!(
            "corrupt entry: length {} exceeds limit of {} bytes",
            len, max_len
        )));
    }

    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn embedding_len(dimension: u32) -> u64 {
    dimension as u64 * FLOAT_SIZE as u64
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::storage(format!("entry too large: {} bytes", len)))
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::storage(format!("invalid build timestamp: {}", ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use tempfile::tempdir;

    fn entry(key: &str, vec: &[f32]) -> Result<StoredEntry> {
        Ok(StoredEntry {
            key: key.to_string(),
            value: codec::encode(vec, ByteOrder::BigEndian),
        })
    }

    fn load(backend: &mut DiskBackend, entries: Vec<Result<StoredEntry>>) -> Result<u64> {
        backend.create_schema()?;
        backend.put_many(&mut entries.into_iter())
    }

    #[test]
    fn test_load_and_lookup() {
        let dir = tempdir().unwrap();
        let mut backend = DiskBackend::open(dir.path(), &StoreConfig::default()).unwrap();
        assert_eq!(backend.state(), StoreState::Uninitialized);

        let written = load(
            &mut backend,
            vec![
                entry("zebra", &[1.0, 2.0]),
                entry("apple", &[3.0, 4.0]),
                entry("mango", &[5.0, 6.0]),
            ],
        )
        .unwrap();
        assert_eq!(written, 3);

        let info = backend.build_index(2).unwrap();
        assert_eq!(info.entries, 3);
        assert_eq!(backend.state(), StoreState::Ready);

        let blob = backend.get("apple").unwrap().unwrap();
        assert_eq!(
            codec::decode(&blob, ByteOrder::BigEndian).unwrap(),
            vec![3.0, 4.0]
        );
        assert!(backend.get("zebra").unwrap().is_some());
        assert!(backend.get("banana").unwrap().is_none());
        assert!(backend.get("").unwrap().is_none());
    }

    #[test]
    fn test_reopen_persisted_store() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::default();
        let built_info = {
            let mut backend = DiskBackend::open(dir.path(), &config).unwrap();
            load(&mut backend, vec![entry("a", &[1.0]), entry("b", &[2.0])]).unwrap();
            let info = backend.build_index(1).unwrap();
            Box::new(backend).close().unwrap();
            info
        };

        let backend = DiskBackend::open(dir.path(), &config).unwrap();
        assert_eq!(backend.state(), StoreState::Ready);
        assert_eq!(backend.info(), Some(&built_info));
        assert!(backend.get("b").unwrap().is_some());

        let keys: Vec<String> = backend.scan().unwrap().map(|e| e.unwrap().key).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_schema_exists() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::default();
        let mut backend = DiskBackend::open(dir.path(), &config).unwrap();
        backend.create_schema().unwrap();
        assert!(matches!(backend.create_schema(), Err(Error::Schema(_))));

        backend.put_many(&mut vec![entry("a", &[1.0])].into_iter()).unwrap();
        backend.build_index(1).unwrap();

        let mut reopened = DiskBackend::open(dir.path(), &config).unwrap();
        assert!(matches!(reopened.create_schema(), Err(Error::Schema(_))));
        assert!(reopened.get("a").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_key_aborts_load() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::default();
        let mut backend = DiskBackend::open(dir.path(), &config).unwrap();

        let err = load(
            &mut backend,
            vec![
                entry("a", &[1.0]),
                entry("b", &[2.0]),
                entry("a", &[3.0]),
                entry("c", &[4.0]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(ref k) if k == "a"));
        assert!(backend.get("a").is_err());

        // "a" and "b" were flushed: header plus two 13-byte entries
        let data_len = fs::metadata(backend.data_path()).unwrap().len();
        assert_eq!(data_len, DATA_HEADER_SIZE + 2 * 13);
        drop(backend);

        // The aborted load left a data file but no index
        let reopened = DiskBackend::open(dir.path(), &config).unwrap();
        assert_eq!(reopened.state(), StoreState::Failed);
        assert!(!reopened.index_path().exists());
    }

    #[test]
    fn test_byte_order_mismatch() {
        let dir = tempdir().unwrap();
        let mut backend = DiskBackend::open(dir.path(), &StoreConfig::default()).unwrap();
        load(&mut backend, vec![entry("a", &[1.0])]).unwrap();
        backend.build_index(1).unwrap();
        drop(backend);

        let little = StoreConfig::default().with_byte_order(ByteOrder::LittleEndian);
        let err = DiskBackend::open(dir.path(), &little).err().unwrap();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_corrupt_data_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("fasttext.dat"), b"JUNK!!").unwrap();
        let err = DiskBackend::open(dir.path(), &StoreConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_many_keys_binary_search() {
        let dir = tempdir().unwrap();
        let mut backend = DiskBackend::open(dir.path(), &StoreConfig::default()).unwrap();

        let entries: Vec<_> = (0..500)
            .map(|i| entry(&format!("word{}", i), &[i as f32]))
            .collect();
        load(&mut backend, entries).unwrap();
        backend.build_index(1).unwrap();

        for i in (0..500).step_by(37) {
            let blob = backend.get(&format!("word{}", i)).unwrap().unwrap();
            assert_eq!(
                codec::decode(&blob, ByteOrder::BigEndian).unwrap(),
                vec![i as f32]
            );
        }
        assert!(backend.get("word500").unwrap().is_none());
        assert!(backend.get("a").unwrap().is_none());
        assert!(backend.get("zzz").unwrap().is_none());
    }

    #[test]
    fn test_pending_keys_during_load() {
        let dir = tempdir().unwrap();
        let mut backend = DiskBackend::open(dir.path(), &StoreConfig::default()).unwrap();
        assert_eq!(backend.pending_keys(), 0);

        load(
            &mut backend,
            vec![entry("x", &[1.0]), entry("y", &[2.0]), entry("z", &[3.0])],
        )
        .unwrap();
        assert_eq!(backend.pending_keys(), 3);

        backend.build_index(1).unwrap();
        assert_eq!(backend.pending_keys(), 0);
    }

    fn patch_data_file(path: &Path, at: u64, bytes: &[u8]) {
        let mut file = OpenOptions::new().write(true).open(path).unwrap();
        file.seek(SeekFrom::Start(at)).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn test_corrupt_key_length_is_rejected() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::default();
        let data_path = {
            let mut backend = DiskBackend::open(dir.path(), &config).unwrap();
            load(&mut backend, vec![entry("a", &[1.0]), entry("b", &[2.0])]).unwrap();
            backend.build_index(1).unwrap();
            backend.data_path()
        };

        // First entry's key length claims 4 GiB
        patch_data_file(&data_path, DATA_HEADER_SIZE, &u32::MAX.to_le_bytes());

        let backend = DiskBackend::open(dir.path(), &config).unwrap();
        assert!(matches!(backend.get("a"), Err(Error::Storage(_))));

        let mut scan = backend.scan().unwrap();
        assert!(matches!(scan.next(), Some(Err(Error::Storage(_)))));
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_corrupt_value_length_is_rejected() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::default();
        let data_path = {
            let mut backend = DiskBackend::open(dir.path(), &config).unwrap();
            load(&mut backend, vec![entry("a", &[1.0]), entry("b", &[2.0])]).unwrap();
            backend.build_index(1).unwrap();
            backend.data_path()
        };

        // Second entry's embedding length: header + first entry + key_len + key
        patch_data_file(&data_path, DATA_HEADER_SIZE + 13 + 4 + 1, &8u32.to_le_bytes());

        let backend = DiskBackend::open(dir.path(), &config).unwrap();
        assert!(backend.get("a").unwrap().is_some());
        assert!(matches!(backend.get("b"), Err(Error::Storage(_))));
    }
}
