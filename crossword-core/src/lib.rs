//! # crossword-core — Shared data model and client puzzle state machine
//!
//! The synchronous heart of the collaborative crossword: an immutable
//! [`PuzzleDescriptor`] describing the grid, and a single-writer
//! [`PuzzleState`] that owns one player's working grid, selection, and
//! direction.
//!
//! ```text
//! ┌──────────────────┐   local input    ┌──────────────┐
//! │ PuzzleDescriptor │ ───────────────► │ PuzzleState  │
//! │ (immutable)      │                  │ (one player) │
//! └──────────────────┘                  └──────┬───────┘
//!                                              │ StateEvent
//!                                     ┌────────┴────────┐
//!                                     ▼                 ▼
//!                                 UI observer     connection manager
//! ```
//!
//! Everything here is pure and synchronous: mutations happen one at a time
//! in response to local input or one inbound network message, so no internal
//! locking is needed. Networking and persistence live in `crossword-collab`.

pub mod events;
pub mod puzzle;
pub mod state;

pub use events::{EventBus, StateEvent};
pub use puzzle::{
    Clue, Clues, DescriptorError, Dimensions, GridCell, PuzzleDescriptor, SolutionCell,
};
pub use state::{CellPos, Direction, MoveDir, PuzzleState};
