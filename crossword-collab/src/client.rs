//! Client-side connection manager.
//!
//! Owns one WebSocket session per active puzzle view. Local state-machine
//! events go out as protocol messages (cursor moves throttled); inbound
//! server messages surface as [`ClientEvent`]s on a channel the view (or a
//! test) drains, and can be folded straight into a
//! [`crossword_core::PuzzleState`] with [`CollabClient::apply_event`].

use crate::presence::CursorThrottle;
use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};
use crossword_core::{PuzzleState, StateEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// What the server told us, translated for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The room was joined and the session is live.
    Connected,
    /// The transport closed; no reconnection is attempted.
    Disconnected,
    /// Room membership changed.
    PlayerCount(usize),
    /// A peer edited a cell.
    RemoteCell {
        row: usize,
        col: usize,
        value: String,
        player_id: String,
    },
    /// A peer's cursor moved.
    RemoteCursor {
        session_id: Uuid,
        player_id: String,
        row: usize,
        col: usize,
    },
    /// A peer left; drop its cursor.
    CursorGone { session_id: Uuid },
}

/// One collaborative session for one puzzle.
pub struct CollabClient {
    puzzle_id: String,
    player_id: String,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    throttle: Mutex<CursorThrottle>,
}

impl CollabClient {
    pub fn new(puzzle_id: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            puzzle_id: puzzle_id.into(),
            player_id: player_id.into(),
            outgoing: None,
            throttle: Mutex::new(CursorThrottle::new()),
        }
    }

    /// Override the cursor rate limit; tests shrink it.
    pub fn set_cursor_throttle(&mut self, throttle: CursorThrottle) {
        self.throttle = Mutex::new(throttle);
    }

    pub fn puzzle_id(&self) -> &str {
        &self.puzzle_id
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn is_connected(&self) -> bool {
        self.outgoing
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Dial the server, join this puzzle's room, and spawn the transport
    /// tasks. Returns the event stream for the session.
    pub async fn connect(
        &mut self,
        url: &str,
    ) -> Result<mpsc::UnboundedReceiver<ClientEvent>, ProtocolError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let join = ClientMessage::RoomJoin {
            puzzle_id: self.puzzle_id.clone(),
            player_id: self.player_id.clone(),
        };
        out_tx
            .send(join.encode()?)
            .map_err(|_| ProtocolError::ConnectionClosed)?;

        // Writer: drain the outbound queue; a dropped sender closes the
        // socket cleanly.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_sender.send(Message::text(frame)).await {
                    log::debug!("outbound send failed: {e}");
                    break;
                }
            }
            let _ = ws_sender.send(Message::Close(None)).await;
        });

        // Reader: translate server messages into client events.
        let events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerMessage::decode(text.as_str()) {
                        Ok(msg) => {
                            if events.send(Self::translate(msg)).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("unreadable server frame: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::debug!("transport error: {e}");
                        break;
                    }
                }
            }
            let _ = events.send(ClientEvent::Disconnected);
        });

        let _ = event_tx.send(ClientEvent::Connected);
        self.outgoing = Some(out_tx);
        Ok(event_rx)
    }

    fn translate(msg: ServerMessage) -> ClientEvent {
        match msg {
            ServerMessage::RoomPlayers { count } => ClientEvent::PlayerCount(count),
            ServerMessage::CellChange {
                row,
                col,
                value,
                player_id,
                ..
            } => ClientEvent::RemoteCell {
                row,
                col,
                value,
                player_id,
            },
            ServerMessage::CursorMoved {
                session_id,
                player_id,
                row,
                col,
            } => ClientEvent::RemoteCursor {
                session_id,
                player_id,
                row,
                col,
            },
            ServerMessage::CursorLeave { session_id } => {
                ClientEvent::CursorGone { session_id }
            }
        }
    }

    fn send(&self, msg: &ClientMessage) -> Result<(), ProtocolError> {
        let tx = self.outgoing.as_ref().ok_or(ProtocolError::NotJoined)?;
        tx.send(msg.encode()?)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Announce a local edit. The caller has already applied it locally.
    pub fn send_cell_change(
        &self,
        row: usize,
        col: usize,
        value: &str,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::CellChange {
            puzzle_id: self.puzzle_id.clone(),
            row,
            col,
            value: value.to_string(),
            player_id: self.player_id.clone(),
        })
    }

    /// Announce a cursor move, rate-limited. Returns whether a message was
    /// actually sent; throttled calls are dropped, not queued.
    pub fn send_cursor(&self, row: usize, col: usize) -> Result<bool, ProtocolError> {
        let allowed = {
            let mut throttle = self
                .throttle
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            throttle.allow()
        };
        if !allowed {
            return Ok(false);
        }
        self.send(&ClientMessage::CursorMove {
            puzzle_id: self.puzzle_id.clone(),
            row,
            col,
        })?;
        Ok(true)
    }

    /// Forward a local state-machine event to the server: optimistic edits
    /// become cell changes, selection moves become (throttled) cursor
    /// moves. Remote-originated edits are not echoed back.
    pub fn forward_state_event(&self, event: &StateEvent) -> Result<(), ProtocolError> {
        match event {
            StateEvent::CellEdited {
                pos,
                value,
                remote: false,
            } => self.send_cell_change(pos.row, pos.col, value),
            StateEvent::SelectionChanged {
                cell: Some(pos), ..
            } => self.send_cursor(pos.row, pos.col).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Fold an inbound event into the local state machine.
    pub fn apply_event(event: &ClientEvent, state: &mut PuzzleState) {
        if let ClientEvent::RemoteCell {
            row, col, value, ..
        } = event
        {
            state.apply_remote_change(*row, *col, value);
        }
    }

    /// Stop the session. The writer task drains pending frames and closes
    /// the socket.
    pub fn close(&mut self) {
        self.outgoing = None;
    }
}
