//! WebSocket collaboration server.
//!
//! One spawned task per connection. Each task owns its session context (id,
//! peer address, joined room) and runs a `select!` loop over the inbound
//! socket and the room's broadcast channel. Room state lives only in the
//! [`RoomRegistry`]; nothing is attached to the socket itself.
//!
//! Edits are persisted through the [`GridStore`] before being relayed.
//! Persistence failures are logged and swallowed: peers still see the edit,
//! durability is best-effort.

use crate::broadcast::{Envelope, RoomChannel, RoomRegistry};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::storage::{GridStore, KvStore, RocksStore, StoreConfig, StoreError, StoredCell};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::accept_async;
use uuid::Uuid;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address, e.g. `127.0.0.1:9090`.
    pub bind_addr: String,
    /// Per-room broadcast channel capacity.
    pub channel_capacity: usize,
    /// RocksDB config; `None` runs without durable storage.
    pub storage: Option<StoreConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            channel_capacity: 256,
            storage: None,
        }
    }
}

/// Process-lifetime counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct ServerStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    messages_received: AtomicU64,
    malformed_messages: AtomicU64,
    edits_relayed: AtomicU64,
    cursor_updates: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub edits_relayed: u64,
    pub cursor_updates: u64,
}

impl ServerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            edits_relayed: self.edits_relayed.load(Ordering::Relaxed),
            cursor_updates: self.cursor_updates.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-connection state, created at accept time and discarded at
/// disconnect. Threaded explicitly through every handler.
struct SessionContext {
    session_id: Uuid,
    addr: SocketAddr,
    joined: Option<JoinedRoom>,
}

struct JoinedRoom {
    puzzle_id: String,
    player_id: String,
    room: Arc<RoomChannel>,
}

/// The room coordinator and cell edit relay.
pub struct CollabServer {
    config: ServerConfig,
    registry: RoomRegistry,
    store: Option<GridStore>,
    stats: ServerStats,
}

impl CollabServer {
    /// Build a server, opening the RocksDB store if one is configured.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let store = match &config.storage {
            Some(store_config) => {
                let rocks = RocksStore::open(store_config.clone())?;
                log::info!("grid store open at {}", rocks.path().display());
                Some(GridStore::new(Arc::new(rocks)))
            }
            None => None,
        };
        Ok(Self::with_parts(config, store))
    }

    /// Build a server over a caller-provided key/value backend.
    pub fn with_kv(config: ServerConfig, kv: Arc<dyn KvStore>) -> Self {
        Self::with_parts(config, Some(GridStore::new(kv)))
    }

    fn with_parts(config: ServerConfig, store: Option<GridStore>) -> Self {
        let registry = RoomRegistry::new(config.channel_capacity);
        Self {
            config,
            registry,
            store,
            stats: ServerStats::default(),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn grid_store(&self) -> Option<&GridStore> {
        self.store.as_ref()
    }

    /// Accept loop. Runs until the listener fails.
    pub async fn run(self: Arc<Self>) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("collab server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, addr).await {
                    log::debug!("connection from {addr} ended: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let mut session = SessionContext {
            session_id: Uuid::new_v4(),
            addr,
            joined: None,
        };
        let mut room_rx: Option<broadcast::Receiver<Arc<Envelope>>> = None;

        ServerStats::bump(&self.stats.total_connections);
        ServerStats::bump(&self.stats.active_connections);
        log::debug!("session {} connected from {addr}", session.session_id);

        loop {
            tokio::select! {
                inbound = ws_receiver.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&mut session, &mut room_rx, text.as_str()).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                                log::debug!(
                                    "session {} pong failed: {e}",
                                    session.session_id
                                );
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(other)) => {
                            log::debug!(
                                "session {} sent unsupported frame: {other:?}",
                                session.session_id
                            );
                        }
                        Some(Err(e)) => {
                            log::debug!("session {} transport error: {e}", session.session_id);
                            break;
                        }
                    }
                }
                outbound = Self::next_envelope(&mut room_rx) => {
                    match outbound {
                        Ok(envelope) => {
                            if envelope.origin != Some(session.session_id) {
                                // A failed write must still fall through to
                                // the disconnect cleanup below, or the dead
                                // session stays counted in its room.
                                if let Err(e) = ws_sender
                                    .send(Message::text(envelope.frame.clone()))
                                    .await
                                {
                                    log::debug!(
                                        "session {} relay write failed: {e}",
                                        session.session_id
                                    );
                                    break;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!(
                                "session {} lagged, {n} frames dropped",
                                session.session_id
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        self.leave_room(&mut session).await;
        self.stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        log::debug!("session {} disconnected", session.session_id);
        Ok(())
    }

    /// Receive from the room channel, or park forever while not joined.
    async fn next_envelope(
        rx: &mut Option<broadcast::Receiver<Arc<Envelope>>>,
    ) -> Result<Arc<Envelope>, broadcast::error::RecvError> {
        match rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Decode and dispatch one inbound frame. A malformed frame is logged
    /// and dropped; the connection stays up.
    async fn handle_frame(
        &self,
        session: &mut SessionContext,
        room_rx: &mut Option<broadcast::Receiver<Arc<Envelope>>>,
        text: &str,
    ) {
        ServerStats::bump(&self.stats.messages_received);

        let msg = match ClientMessage::decode(text) {
            Ok(msg) => msg,
            Err(e) => {
                ServerStats::bump(&self.stats.malformed_messages);
                log::warn!("malformed frame from {}: {e}", session.addr);
                return;
            }
        };

        match msg {
            ClientMessage::RoomJoin {
                puzzle_id,
                player_id,
            } => {
                if session.joined.is_some() {
                    self.leave_room(session).await;
                    *room_rx = None;
                }

                // Resolve and register through the registry in one step;
                // resolving the Arc first would let a concurrent teardown
                // strand this session in a deregistered channel.
                let (room, rx) = self
                    .registry
                    .join(&puzzle_id, session.session_id, player_id.clone())
                    .await;
                *room_rx = Some(rx);
                let count = room.session_count().await;
                log::info!(
                    "session {} joined room {puzzle_id} as {player_id:?} ({count} active)",
                    session.session_id
                );

                if let Err(e) = room.send_to_all(&ServerMessage::RoomPlayers { count }) {
                    log::warn!("player-count broadcast for {puzzle_id} failed: {e}");
                }
                session.joined = Some(JoinedRoom {
                    puzzle_id,
                    player_id,
                    room,
                });
            }

            ClientMessage::CellChange {
                puzzle_id,
                row,
                col,
                value,
                player_id,
            } => {
                let Some(joined) = &session.joined else {
                    log::warn!(
                        "session {} sent an edit before joining a room",
                        session.session_id
                    );
                    return;
                };
                if joined.puzzle_id != puzzle_id {
                    log::warn!(
                        "session {} sent an edit for {puzzle_id} while in {}",
                        session.session_id,
                        joined.puzzle_id
                    );
                    return;
                }

                if let Some(store) = &self.store {
                    let cell = StoredCell::new(value.clone(), player_id.clone());
                    if let Err(e) = store.upsert_cell(&puzzle_id, row, col, &cell) {
                        // Peers still see the edit; durability is best-effort.
                        log::error!(
                            "persisting cell ({row},{col}) for {puzzle_id} failed: {e}"
                        );
                    }
                }

                ServerStats::bump(&self.stats.edits_relayed);
                let relay = ServerMessage::CellChange {
                    puzzle_id,
                    row,
                    col,
                    value,
                    player_id,
                };
                if let Err(e) = joined.room.send_from(session.session_id, &relay) {
                    log::warn!("edit relay failed: {e}");
                }
            }

            ClientMessage::CursorMove {
                puzzle_id,
                row,
                col,
            } => {
                let Some(joined) = &session.joined else {
                    return;
                };
                if joined.puzzle_id != puzzle_id {
                    return;
                }

                joined
                    .room
                    .update_cursor(session.session_id, row, col)
                    .await;
                ServerStats::bump(&self.stats.cursor_updates);

                let relay = ServerMessage::CursorMoved {
                    session_id: session.session_id,
                    player_id: joined.player_id.clone(),
                    row,
                    col,
                };
                if let Err(e) = joined.room.send_from(session.session_id, &relay) {
                    log::warn!("cursor relay failed: {e}");
                }
            }
        }
    }

    /// Remove the session from its room, broadcast the new count and a
    /// cursor-removal notice, and drop the room if it is now empty. No-op
    /// for sessions that never joined.
    async fn leave_room(&self, session: &mut SessionContext) {
        let Some(joined) = session.joined.take() else {
            return;
        };

        if joined.room.leave(session.session_id).await.is_none() {
            // Stale reference; nothing to announce.
            return;
        }

        let count = joined.room.session_count().await;
        log::info!(
            "session {} left room {} ({count} active)",
            session.session_id,
            joined.puzzle_id
        );

        if let Err(e) = joined.room.send_to_all(&ServerMessage::RoomPlayers { count }) {
            log::debug!("player-count broadcast after leave failed: {e}");
        }
        if let Err(e) = joined.room.send_from(
            session.session_id,
            &ServerMessage::CursorLeave {
                session_id: session.session_id,
            },
        ) {
            log::debug!("cursor-leave broadcast failed: {e}");
        }

        if self.registry.remove_if_empty(&joined.puzzle_id).await {
            log::debug!("room {} removed", joined.puzzle_id);
        }
    }
}
