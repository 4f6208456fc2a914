//! Per-room fan-out and membership.
//!
//! Each room owns a `tokio::sync::broadcast` channel carrying pre-encoded
//! frames wrapped in an [`Envelope`]. A frame is encoded once per event and
//! shared via `Arc`, so fan-out to N sessions never re-serializes. The
//! envelope records the originating session so each connection's forward
//! loop can skip echoing a sender's own message back to it.

use crate::protocol::{ProtocolError, ServerMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// A pre-encoded frame plus its origin. `origin: None` means the frame
/// should reach every session in the room, the originator included.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Option<Uuid>,
    pub frame: String,
}

/// One live session's membership record.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub player_id: String,
    pub cursor: Option<(usize, usize)>,
}

/// The fan-out channel and membership set for a single puzzle's room.
pub struct RoomChannel {
    puzzle_id: String,
    sender: broadcast::Sender<Arc<Envelope>>,
    sessions: RwLock<HashMap<Uuid, SessionInfo>>,
    frames_sent: AtomicU64,
}

impl RoomChannel {
    pub fn new(puzzle_id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            puzzle_id: puzzle_id.into(),
            sender,
            sessions: RwLock::new(HashMap::new()),
            frames_sent: AtomicU64::new(0),
        }
    }

    pub fn puzzle_id(&self) -> &str {
        &self.puzzle_id
    }

    /// Register a session and return its receiver half. The caller must
    /// subscribe before any membership broadcast it expects to observe.
    pub async fn join(
        &self,
        session_id: Uuid,
        player_id: impl Into<String>,
    ) -> broadcast::Receiver<Arc<Envelope>> {
        let rx = self.sender.subscribe();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_id,
            SessionInfo {
                session_id,
                player_id: player_id.into(),
                cursor: None,
            },
        );
        rx
    }

    /// Remove a session. Returns its record if it was present; removing an
    /// unknown session is a no-op.
    pub async fn leave(&self, session_id: Uuid) -> Option<SessionInfo> {
        self.sessions.write().await.remove(&session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn update_cursor(&self, session_id: Uuid, row: usize, col: usize) {
        if let Some(info) = self.sessions.write().await.get_mut(&session_id) {
            info.cursor = Some((row, col));
        }
    }

    /// Encode and send to every session, the originator included.
    pub fn send_to_all(&self, msg: &ServerMessage) -> Result<usize, ProtocolError> {
        self.send_envelope(None, msg)
    }

    /// Encode and send to every session except `origin`.
    pub fn send_from(&self, origin: Uuid, msg: &ServerMessage) -> Result<usize, ProtocolError> {
        self.send_envelope(Some(origin), msg)
    }

    fn send_envelope(
        &self,
        origin: Option<Uuid>,
        msg: &ServerMessage,
    ) -> Result<usize, ProtocolError> {
        let frame = msg.encode()?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        // A send error just means no live receivers; the room may be
        // mid-teardown, which is not a caller problem.
        Ok(self
            .sender
            .send(Arc::new(Envelope { origin, frame }))
            .unwrap_or(0))
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

/// Owns every active room, keyed by puzzle id. Constructed once per server
/// instance; rooms are created lazily on first join and dropped when their
/// last session leaves.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<RoomChannel>>>,
    channel_capacity: usize,
}

impl RoomRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            channel_capacity,
        }
    }

    pub async fn get_or_create(&self, puzzle_id: &str) -> Arc<RoomChannel> {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(puzzle_id) {
                return Arc::clone(room);
            }
        }
        let mut rooms = self.rooms.write().await;
        // Re-check under the write lock; another task may have won the race.
        if let Some(room) = rooms.get(puzzle_id) {
            return Arc::clone(room);
        }
        let room = Arc::new(RoomChannel::new(puzzle_id, self.channel_capacity));
        rooms.insert(puzzle_id.to_string(), Arc::clone(&room));
        room
    }

    pub async fn get(&self, puzzle_id: &str) -> Option<Arc<RoomChannel>> {
        self.rooms.read().await.get(puzzle_id).map(Arc::clone)
    }

    /// Resolve the room for `puzzle_id` and register the session in it,
    /// all under the registry lock. A concurrent [`Self::remove_if_empty`]
    /// cannot run between the lookup and the insert, so the session never
    /// lands in a channel that has already been deregistered.
    pub async fn join(
        &self,
        puzzle_id: &str,
        session_id: Uuid,
        player_id: impl Into<String>,
    ) -> (Arc<RoomChannel>, broadcast::Receiver<Arc<Envelope>>) {
        let mut rooms = self.rooms.write().await;
        let room = match rooms.get(puzzle_id) {
            Some(room) => Arc::clone(room),
            None => {
                let room = Arc::new(RoomChannel::new(puzzle_id, self.channel_capacity));
                rooms.insert(puzzle_id.to_string(), Arc::clone(&room));
                room
            }
        };
        let rx = room.join(session_id, player_id).await;
        (room, rx)
    }

    /// Drop the room entry if its session set is empty. Returns true when
    /// the entry was removed.
    pub async fn remove_if_empty(&self, puzzle_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let empty = match rooms.get(puzzle_id) {
            Some(room) => room.is_empty().await,
            None => return false,
        };
        if empty {
            rooms.remove(puzzle_id);
        }
        empty
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
