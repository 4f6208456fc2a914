//! Cursor presence: client-side rate limiting and peer cursor tracking.
//!
//! Cursor positions are ephemeral. Nothing here is persisted; a client
//! joining mid-session sees no cursors until peers move again.

use crate::protocol::ServerMessage;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Minimum gap between outbound cursor messages.
pub const CURSOR_INTERVAL: Duration = Duration::from_millis(100);

/// Drop-based rate limiter for outbound cursor moves: a call inside the
/// interval is discarded, never queued. The next allowed call carries the
/// then-current position, so a stale position is never sent late.
#[derive(Debug)]
pub struct CursorThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl Default for CursorThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorThrottle {
    pub fn new() -> Self {
        Self::with_interval(CURSOR_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    /// Whether a cursor message may be sent now. Advances the window on
    /// success.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last_sent {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_sent = Some(now);
                true
            }
        }
    }
}

/// A peer's last-known cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCursor {
    pub player_id: String,
    pub row: usize,
    pub col: usize,
}

/// Client-side view of every peer cursor in the room, keyed by the peer's
/// session id so duplicate tabs of one player show as separate cursors.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    peers: HashMap<Uuid, PeerCursor>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a presence-relevant server message into the tracker. Other
    /// message kinds are ignored.
    pub fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::CursorMoved {
                session_id,
                player_id,
                row,
                col,
            } => {
                self.peers.insert(
                    *session_id,
                    PeerCursor {
                        player_id: player_id.clone(),
                        row: *row,
                        col: *col,
                    },
                );
            }
            ServerMessage::CursorLeave { session_id } => {
                self.peers.remove(session_id);
            }
            _ => {}
        }
    }

    pub fn cursor_of(&self, session_id: Uuid) -> Option<&PeerCursor> {
        self.peers.get(&session_id)
    }

    pub fn cursors(&self) -> impl Iterator<Item = (Uuid, &PeerCursor)> {
        self.peers.iter().map(|(id, c)| (*id, c))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop all cursors, e.g. after a disconnect.
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_drops_calls_inside_interval() {
        let mut throttle = CursorThrottle::with_interval(Duration::from_millis(100));
        let allowed = (0..10).filter(|_| throttle.allow()).count();
        assert_eq!(allowed, 1);
    }

    #[test]
    fn throttle_reopens_after_interval() {
        let mut throttle = CursorThrottle::with_interval(Duration::from_millis(10));
        assert!(throttle.allow());
        assert!(!throttle.allow());
        std::thread::sleep(Duration::from_millis(15));
        assert!(throttle.allow());
    }

    #[test]
    fn tracker_follows_moves_and_leaves() {
        let mut tracker = PresenceTracker::new();
        let peer = Uuid::new_v4();

        tracker.apply(&ServerMessage::CursorMoved {
            session_id: peer,
            player_id: "alice".to_string(),
            row: 1,
            col: 2,
        });
        assert_eq!(
            tracker.cursor_of(peer),
            Some(&PeerCursor {
                player_id: "alice".to_string(),
                row: 1,
                col: 2
            })
        );

        // A newer move supersedes.
        tracker.apply(&ServerMessage::CursorMoved {
            session_id: peer,
            player_id: "alice".to_string(),
            row: 3,
            col: 4,
        });
        assert_eq!(tracker.cursor_of(peer).map(|c| (c.row, c.col)), Some((3, 4)));

        tracker.apply(&ServerMessage::CursorLeave { session_id: peer });
        assert!(tracker.is_empty());
    }

    #[test]
    fn duplicate_tabs_show_separate_cursors() {
        let mut tracker = PresenceTracker::new();
        for _ in 0..2 {
            tracker.apply(&ServerMessage::CursorMoved {
                session_id: Uuid::new_v4(),
                player_id: "alice".to_string(),
                row: 0,
                col: 0,
            });
        }
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn non_presence_messages_are_ignored() {
        let mut tracker = PresenceTracker::new();
        tracker.apply(&ServerMessage::RoomPlayers { count: 3 });
        assert!(tracker.is_empty());
    }
}
