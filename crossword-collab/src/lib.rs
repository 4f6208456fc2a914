//! # crossword-collab — Real-time collaborative solving
//!
//! The synchronization engine: rooms, presence, the cell edit relay, and
//! the durable shared grid.
//!
//! ```text
//! ┌──────────────┐  cell:change   ┌──────────────┐  upsert   ┌───────────┐
//! │ CollabClient │ ─────────────► │ CollabServer │ ────────► │ GridStore │
//! │ (per view)   │ ◄───────────── │ (rooms)      │           │ (RocksDB) │
//! └──────┬───────┘   relayed      └──────┬───────┘           └───────────┘
//!        │                               │
//!        ▼ ClientEvent                   ▼ per-room broadcast
//! ┌──────────────┐                ┌──────────────┐
//! │ PuzzleState  │                │ RoomChannel  │
//! │ (core crate) │                │ (fan-out)    │
//! └──────────────┘                └──────────────┘
//! ```
//!
//! Ordering is arrival order at the server; the last edit processed for a
//! cell wins. Persistence is best-effort: a failed write is logged and the
//! relay proceeds.

pub mod broadcast;
pub mod client;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod storage;

pub use broadcast::{Envelope, RoomChannel, RoomRegistry, SessionInfo};
pub use client::{ClientEvent, CollabClient};
pub use presence::{CursorThrottle, PeerCursor, PresenceTracker, CURSOR_INTERVAL};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use server::{CollabServer, ServerConfig, StatsSnapshot};
pub use storage::{GridStore, KvStore, MemoryStore, RocksStore, StoreConfig, StoreError, StoredCell};
