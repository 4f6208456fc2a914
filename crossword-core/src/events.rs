//! Typed event channel for state machine observers.
//!
//! Multiple observers (UI, connection manager, tests) subscribe
//! independently; a dropped receiver is pruned on the next publish, so an
//! observer going away never wedges the state machine.

use std::sync::mpsc;

use crate::state::{CellPos, Direction};

/// Events emitted by [`crate::PuzzleState`] after each accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// A descriptor was loaded and the working grid reset.
    Loaded,
    /// Selection moved (or was cleared).
    SelectionChanged {
        cell: Option<CellPos>,
        direction: Direction,
    },
    /// The active direction flipped without the selection moving.
    DirectionChanged(Direction),
    /// A cell's working value changed. `remote` is true for edits applied
    /// from peers, false for local keystrokes.
    CellEdited {
        pos: CellPos,
        value: String,
        remote: bool,
    },
    /// `check_puzzle` ran; carries the mismatching cells.
    Checked(Vec<CellPos>),
    /// The solution was copied into the working grid.
    Revealed,
}

/// Fan-out of [`StateEvent`]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::Sender<StateEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new observer.
    pub fn subscribe(&mut self) -> mpsc::Receiver<StateEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, dropping dead ones.
    pub fn publish(&mut self, event: StateEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
