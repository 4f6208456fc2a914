//! Durable storage for the shared grid.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐   cell upserts   ┌───────────────┐
//! │ CollabServer │ ───────────────► │ GridStore     │
//! │ (in-memory)  │                  │ (typed layer) │
//! └──────────────┘                  └───────┬───────┘
//!                                           │ KvStore trait
//!                            ┌──────────────┴──────────────┐
//!                            ▼                             ▼
//!                     ┌─────────────┐              ┌──────────────┐
//!                     │ MemoryStore │              │ RocksStore   │
//!                     │ (tests)     │              │ (production) │
//!                     └─────────────┘              └──────────────┘
//! ```
//!
//! Layout, per puzzle id:
//! - string record `puzzle:{id}` — the serialized descriptor (JSON)
//! - hash record `game:{id}` — one field per cell, named `"row,col"`,
//!   holding a bincode [`StoredCell`]
//!
//! Writes are per-cell field upserts, never whole-record read-modify-write,
//! so two edits to different cells can land concurrently without one
//! silently discarding the other.

pub mod rocks;

pub use rocks::{RocksStore, StoreConfig};

use crossword_core::PuzzleDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Backend failure (RocksDB error, poisoned lock).
    Database(String),
    /// Serialization failed.
    Serialization(String),
    /// Deserialization failed.
    Deserialization(String),
    /// LZ4 decompression failed.
    Compression(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {e}"),
            StoreError::Serialization(e) => write!(f, "serialization error: {e}"),
            StoreError::Deserialization(e) => write!(f, "deserialization error: {e}"),
            StoreError::Compression(e) => write!(f, "compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Minimal key/value surface the relay needs: plain string records plus
/// hash records with atomic per-field upsert. Implementations are
/// synchronous; callers on the async path treat each call as a short
/// blocking operation.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<(), StoreError>;
    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

/// In-memory [`KvStore`] used by tests and storage-less deployments.
#[derive(Default)]
pub struct MemoryStore {
    strings: RwLock<HashMap<String, Vec<u8>>>,
    hashes: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let strings = self
            .strings
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(strings.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut strings = self
            .strings
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        strings.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let hashes = self
            .hashes
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut hashes = self
            .hashes
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let hashes = self
            .hashes
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

/// One durable cell record: the last accepted write for a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCell {
    /// Cell value, empty for an erase. Never deleted, only overwritten.
    pub value: String,
    /// Asserted id of the player whose edit this was.
    pub player_id: String,
    /// Milliseconds since epoch at the time the server accepted the edit.
    pub timestamp_ms: u64,
}

impl StoredCell {
    pub fn new(value: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            player_id: player_id.into(),
            timestamp_ms: now_ms(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (cell, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(cell)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Typed access to the grid layout on top of any [`KvStore`].
pub struct GridStore {
    kv: Arc<dyn KvStore>,
}

impl GridStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn puzzle_key(puzzle_id: &str) -> String {
        format!("puzzle:{puzzle_id}")
    }

    fn game_key(puzzle_id: &str) -> String {
        format!("game:{puzzle_id}")
    }

    fn cell_field(row: usize, col: usize) -> String {
        format!("{row},{col}")
    }

    /// Save the immutable descriptor under its string record.
    pub fn save_descriptor(
        &self,
        puzzle_id: &str,
        descriptor: &PuzzleDescriptor,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(descriptor)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.kv.set(&Self::puzzle_key(puzzle_id), &bytes)
    }

    pub fn load_descriptor(
        &self,
        puzzle_id: &str,
    ) -> Result<Option<PuzzleDescriptor>, StoreError> {
        match self.kv.get(&Self::puzzle_key(puzzle_id))? {
            Some(bytes) => {
                let descriptor = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(descriptor))
            }
            None => Ok(None),
        }
    }

    /// Record a single cell write as an atomic field upsert.
    pub fn upsert_cell(
        &self,
        puzzle_id: &str,
        row: usize,
        col: usize,
        cell: &StoredCell,
    ) -> Result<(), StoreError> {
        self.kv.hash_set(
            &Self::game_key(puzzle_id),
            &Self::cell_field(row, col),
            &cell.encode()?,
        )
    }

    pub fn cell(
        &self,
        puzzle_id: &str,
        row: usize,
        col: usize,
    ) -> Result<Option<StoredCell>, StoreError> {
        match self
            .kv
            .hash_get(&Self::game_key(puzzle_id), &Self::cell_field(row, col))?
        {
            Some(bytes) => Ok(Some(StoredCell::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load every recorded cell for a puzzle, for rehydrating late joiners.
    /// Fields that fail to parse are logged and skipped.
    pub fn load_cells(
        &self,
        puzzle_id: &str,
    ) -> Result<HashMap<(usize, usize), StoredCell>, StoreError> {
        let mut cells = HashMap::new();
        for (field, bytes) in self.kv.hash_get_all(&Self::game_key(puzzle_id))? {
            let pos = field
                .split_once(',')
                .and_then(|(r, c)| Some((r.parse().ok()?, c.parse().ok()?)));
            let Some((row, col)) = pos else {
                log::warn!("skipping malformed cell field {field:?} for {puzzle_id}");
                continue;
            };
            match StoredCell::decode(&bytes) {
                Ok(cell) => {
                    cells.insert((row, col), cell);
                }
                Err(e) => {
                    log::warn!("skipping unreadable cell {field:?} for {puzzle_id}: {e}");
                }
            }
        }
        Ok(cells)
    }
}
