//! Wire protocol for collaborative sessions.
//!
//! Every frame is a JSON text message with an `event` discriminator and a
//! `data` payload, so browser clients can speak it without a codegen step.
//! Client-to-server and server-to-client messages are separate enums: the
//! cursor event is asymmetric (the server stamps the originating session id
//! and player id onto relayed cursor positions).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Enter the room for a puzzle. A session can be in at most one room;
    /// joining another leaves the current one first.
    #[serde(rename = "room:join", rename_all = "camelCase")]
    RoomJoin { puzzle_id: String, player_id: String },

    /// A letter was typed or erased at a cell.
    #[serde(rename = "cell:change", rename_all = "camelCase")]
    CellChange {
        puzzle_id: String,
        row: usize,
        col: usize,
        /// Single uppercase letter, or empty for an erase.
        value: String,
        player_id: String,
    },

    /// The client's selected cell moved.
    #[serde(rename = "cursor:move", rename_all = "camelCase")]
    CursorMove {
        puzzle_id: String,
        row: usize,
        col: usize,
    },
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Current session count for the room, sent to every member (including
    /// the session that triggered the change) whenever it changes.
    #[serde(rename = "room:players", rename_all = "camelCase")]
    RoomPlayers { count: usize },

    /// A cell edit relayed from another session.
    #[serde(rename = "cell:change", rename_all = "camelCase")]
    CellChange {
        puzzle_id: String,
        row: usize,
        col: usize,
        value: String,
        player_id: String,
    },

    /// A cursor position relayed from another session, stamped with the
    /// originating session id so clients can track one cursor per session.
    #[serde(rename = "cursor:move", rename_all = "camelCase")]
    CursorMoved {
        #[serde(rename = "socketId")]
        session_id: Uuid,
        player_id: String,
        row: usize,
        col: usize,
    },

    /// A session left the room; its cursor should disappear.
    #[serde(rename = "cursor:leave", rename_all = "camelCase")]
    CursorLeave {
        #[serde(rename = "socketId")]
        session_id: Uuid,
    },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
    Transport(String),
    ConnectionClosed,
    NotJoined,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Serialization(e) => write!(f, "serialization failed: {e}"),
            ProtocolError::Deserialization(e) => write!(f, "deserialization failed: {e}"),
            ProtocolError::Transport(e) => write!(f, "transport error: {e}"),
            ProtocolError::ConnectionClosed => write!(f, "connection closed"),
            ProtocolError::NotJoined => write!(f, "not joined to a room"),
        }
    }
}

impl std::error::Error for ProtocolError {}
