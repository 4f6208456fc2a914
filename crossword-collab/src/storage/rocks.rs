//! RocksDB-backed [`KvStore`].
//!
//! Column families:
//! - `strings` — plain records (LZ4 compressed), e.g. serialized descriptors
//! - `hashes`  — hash fields stored as composite keys `key \0 field`
//!
//! A hash upsert is a single point write under the composite key, so
//! concurrent edits to different cells of the same puzzle never touch the
//! same RocksDB key.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, MultiThreaded, Options, WriteOptions,
};
use std::path::{Path, PathBuf};

use super::{KvStore, StoreError};

const CF_STRINGS: &str = "strings";
const CF_HASHES: &str = "hashes";

const COLUMN_FAMILIES: &[&str] = &[CF_STRINGS, CF_HASHES];

/// Separator between the hash key and the field in a composite key. Keys
/// and fields must not contain NUL; puzzle ids and `"row,col"` fields never
/// do.
const FIELD_SEP: u8 = 0;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("crossword_data"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Config for tests (small caches, caller-provided temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 2 * 1024 * 1024,
        }
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Durable [`KvStore`] on RocksDB.
pub struct RocksStore {
    db: DBWithThreadMode<MultiThreaded>,
    config: StoreConfig,
}

impl RocksStore {
    /// Open (or create) the store at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(&config)))
            .collect();

        let db = DBWithThreadMode::<MultiThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self { db, config })
    }

    fn cf_options(config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(DBCompressionType::Lz4);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(2);

        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family {name:?} not found")))
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }

    fn composite_key(key: &str, field: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(key.len() + 1 + field.len());
        k.extend_from_slice(key.as_bytes());
        k.push(FIELD_SEP);
        k.extend_from_slice(field.as_bytes());
        k
    }

    fn compress(value: &[u8]) -> Vec<u8> {
        lz4_flex::compress_prepend_size(value)
    }

    fn decompress(bytes: &[u8]) -> Result<Vec<u8>, StoreError> {
        lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| StoreError::Compression(e.to_string()))
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(CF_STRINGS)?;
        match self.db.get_cf(&cf, key.as_bytes())? {
            Some(compressed) => Ok(Some(Self::decompress(&compressed)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let cf = self.cf(CF_STRINGS)?;
        self.db
            .put_cf_opt(&cf, key.as_bytes(), Self::compress(value), &self.write_opts())?;
        Ok(())
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(CF_HASHES)?;
        match self.db.get_cf(&cf, Self::composite_key(key, field))? {
            Some(compressed) => Ok(Some(Self::decompress(&compressed)?)),
            None => Ok(None),
        }
    }

    fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<(), StoreError> {
        let cf = self.cf(CF_HASHES)?;
        self.db.put_cf_opt(
            &cf,
            Self::composite_key(key, field),
            Self::compress(value),
            &self.write_opts(),
        )?;
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let cf = self.cf(CF_HASHES)?;
        let mut prefix = key.as_bytes().to_vec();
        prefix.push(FIELD_SEP);

        let mut fields = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (k, v) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !k.starts_with(&prefix) {
                break;
            }
            let field = String::from_utf8_lossy(&k[prefix.len()..]).into_owned();
            fields.push((field, Self::decompress(&v)?));
        }

        Ok(fields)
    }
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
