//! The client puzzle state machine.
//!
//! Owns one player's working grid, selection, and direction, and answers
//! the navigation queries the view needs. Single-writer: every mutation
//! happens in response to one local input or one inbound network message,
//! so there is no internal locking.
//!
//! Local edits are applied optimistically; the connection manager observes
//! [`StateEvent::CellEdited`] with `remote: false` and forwards them to the
//! relay. Peer edits come back through [`PuzzleState::apply_remote_change`],
//! which overwrites the cell without touching selection or direction.

use std::collections::HashSet;
use std::sync::mpsc;

use crate::events::{EventBus, StateEvent};
use crate::puzzle::{PuzzleDescriptor, SolutionCell};

/// Block marker in the working grid.
pub const BLOCK: &str = "#";

/// Active entry direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Across,
    Down,
}

impl Direction {
    pub fn toggled(self) -> Self {
        match self {
            Direction::Across => Direction::Down,
            Direction::Down => Direction::Across,
        }
    }
}

/// One-step movement requested by the arrow keys (screen directions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDir {
    Up,
    Down,
    Left,
    Right,
}

/// A cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// One player's in-progress view of a puzzle.
#[derive(Debug, Default)]
pub struct PuzzleState {
    puzzle: Option<PuzzleDescriptor>,
    player_grid: Vec<Vec<String>>,
    selected: Option<CellPos>,
    direction: Direction,
    incorrect: HashSet<CellPos>,
    events: EventBus,
}

impl PuzzleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer for state events.
    pub fn subscribe(&mut self) -> mpsc::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Load a descriptor, resetting selection to none and direction to
    /// across. The working grid mirrors the block layout: `"#"` where
    /// blocked, empty elsewhere.
    pub fn load(&mut self, descriptor: PuzzleDescriptor) {
        self.player_grid = descriptor
            .grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        if cell.is_block() {
                            BLOCK.to_string()
                        } else {
                            String::new()
                        }
                    })
                    .collect()
            })
            .collect();
        self.puzzle = Some(descriptor);
        self.selected = None;
        self.direction = Direction::Across;
        self.incorrect.clear();
        self.events.publish(StateEvent::Loaded);
    }

    pub fn descriptor(&self) -> Option<&PuzzleDescriptor> {
        self.puzzle.as_ref()
    }

    pub fn selected_cell(&self) -> Option<CellPos> {
        self.selected
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Working value at a position; empty string when out of bounds.
    pub fn value_at(&self, row: usize, col: usize) -> &str {
        self.player_grid
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Cells currently marked incorrect by `check_puzzle`.
    pub fn incorrect_cells(&self) -> Vec<CellPos> {
        self.incorrect.iter().copied().collect()
    }

    pub fn is_marked_incorrect(&self, pos: CellPos) -> bool {
        self.incorrect.contains(&pos)
    }

    /// Select a cell. No-op on blocks; re-selecting the selected cell
    /// toggles the direction instead.
    pub fn select(&mut self, row: usize, col: usize) {
        let Some(puzzle) = &self.puzzle else { return };
        if puzzle.is_block(row, col) {
            return;
        }

        let pos = CellPos::new(row, col);
        if self.selected == Some(pos) {
            self.direction = self.direction.toggled();
            self.events
                .publish(StateEvent::DirectionChanged(self.direction));
            return;
        }

        self.selected = Some(pos);
        self.events.publish(StateEvent::SelectionChanged {
            cell: self.selected,
            direction: self.direction,
        });
    }

    /// Explicit direction override (clue click).
    pub fn set_direction(&mut self, direction: Direction) {
        if self.direction != direction {
            self.direction = direction;
            self.events
                .publish(StateEvent::DirectionChanged(self.direction));
        }
    }

    /// Direction-toggle key.
    pub fn toggle_direction(&mut self) {
        self.direction = self.direction.toggled();
        self.events
            .publish(StateEvent::DirectionChanged(self.direction));
    }

    /// Type a letter into the selected cell, clear its incorrect mark, and
    /// advance along the current direction to the next non-block cell.
    /// Selection stays put at the end of a run.
    pub fn enter_letter(&mut self, letter: char) {
        if self.puzzle.is_none() {
            return;
        }
        let Some(pos) = self.selected else { return };

        let value = letter.to_ascii_uppercase().to_string();
        self.player_grid[pos.row][pos.col] = value.clone();
        self.incorrect.remove(&pos);
        self.events.publish(StateEvent::CellEdited {
            pos,
            value,
            remote: false,
        });

        if let Some(next) = self.next_cell(pos) {
            self.selected = Some(next);
            self.events.publish(StateEvent::SelectionChanged {
                cell: self.selected,
                direction: self.direction,
            });
        }
    }

    /// Backspace. An empty selected cell moves selection back along the
    /// current direction and clears that cell; a filled cell is cleared in
    /// place.
    pub fn clear_cell(&mut self) {
        if self.puzzle.is_none() {
            return;
        }
        let Some(pos) = self.selected else { return };

        if self.player_grid[pos.row][pos.col].is_empty() {
            let Some(prev) = self.prev_cell(pos) else {
                return;
            };
            self.player_grid[prev.row][prev.col].clear();
            self.selected = Some(prev);
            self.events.publish(StateEvent::CellEdited {
                pos: prev,
                value: String::new(),
                remote: false,
            });
            self.events.publish(StateEvent::SelectionChanged {
                cell: self.selected,
                direction: self.direction,
            });
            return;
        }

        self.player_grid[pos.row][pos.col].clear();
        self.events.publish(StateEvent::CellEdited {
            pos,
            value: String::new(),
            remote: false,
        });
    }

    /// Arrow-key movement: one step, clamped to the grid. A step onto a
    /// block is rejected outright — the selection does not skip past it.
    pub fn move_selection(&mut self, dir: MoveDir) {
        let Some(puzzle) = &self.puzzle else { return };
        let Some(pos) = self.selected else { return };

        let (row, col) = match dir {
            MoveDir::Up => (pos.row.saturating_sub(1), pos.col),
            MoveDir::Down => ((pos.row + 1).min(puzzle.height() - 1), pos.col),
            MoveDir::Left => (pos.row, pos.col.saturating_sub(1)),
            MoveDir::Right => (pos.row, (pos.col + 1).min(puzzle.width() - 1)),
        };

        if puzzle.is_block(row, col) {
            return;
        }

        let next = CellPos::new(row, col);
        if next != pos {
            self.selected = Some(next);
            self.events.publish(StateEvent::SelectionChanged {
                cell: self.selected,
                direction: self.direction,
            });
        }
    }

    /// Compare every non-block, non-empty working cell against the solution
    /// and mark the mismatches. Empty and matching cells are never marked.
    pub fn check_puzzle(&mut self) -> Vec<CellPos> {
        let Some(puzzle) = &self.puzzle else {
            return Vec::new();
        };

        let mut incorrect = HashSet::new();
        for (row, cells) in self.player_grid.iter().enumerate() {
            for (col, value) in cells.iter().enumerate() {
                if value.is_empty() || value == BLOCK {
                    continue;
                }
                let matches = puzzle
                    .solution_at(row, col)
                    .and_then(SolutionCell::letters)
                    .is_some_and(|s| s == value);
                if !matches {
                    incorrect.insert(CellPos::new(row, col));
                }
            }
        }

        self.incorrect = incorrect;
        let marked = self.incorrect_cells();
        self.events.publish(StateEvent::Checked(marked.clone()));
        marked
    }

    /// Copy the solution into the working grid and clear incorrect marks.
    pub fn reveal_puzzle(&mut self) {
        let Some(puzzle) = &self.puzzle else { return };

        self.player_grid = puzzle
            .solution
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        SolutionCell::Letter(s) => s.clone(),
                        SolutionCell::Block => BLOCK.to_string(),
                        SolutionCell::Absent => String::new(),
                    })
                    .collect()
            })
            .collect();
        self.incorrect.clear();
        self.events.publish(StateEvent::Revealed);
    }

    /// Apply an edit that arrived from a peer: overwrite the cell without
    /// moving selection or changing direction. Out-of-bounds coordinates
    /// are rejected with a warning.
    pub fn apply_remote_change(&mut self, row: usize, col: usize, value: &str) {
        let Some(puzzle) = &self.puzzle else { return };
        if !puzzle.in_bounds(row, col) {
            log::warn!("remote change out of bounds at ({row},{col}), dropping");
            return;
        }

        self.player_grid[row][col] = value.to_string();
        self.events.publish(StateEvent::CellEdited {
            pos: CellPos::new(row, col),
            value: value.to_string(),
            remote: true,
        });
    }

    /// The maximal run of non-block cells through the selection along the
    /// active direction. Empty when nothing is selected.
    pub fn current_word(&self) -> Vec<CellPos> {
        let (Some(puzzle), Some(pos)) = (&self.puzzle, self.selected) else {
            return Vec::new();
        };

        let start = self.run_start(pos);
        let mut cells = Vec::new();
        match self.direction {
            Direction::Across => {
                let mut col = start.col;
                while col < puzzle.width() && !puzzle.is_block(pos.row, col) {
                    cells.push(CellPos::new(pos.row, col));
                    col += 1;
                }
            }
            Direction::Down => {
                let mut row = start.row;
                while row < puzzle.height() && !puzzle.is_block(row, pos.col) {
                    cells.push(CellPos::new(row, pos.col));
                    row += 1;
                }
            }
        }
        cells
    }

    /// The clue number at the start of the current word, or `None` when the
    /// run's first cell carries no number (possible only in unnumbered
    /// grids) or nothing is selected.
    pub fn current_clue_number(&self) -> Option<u32> {
        let puzzle = self.puzzle.as_ref()?;
        let pos = self.selected?;
        let start = self.run_start(pos);
        puzzle.number_at(start.row, start.col)
    }

    /// Text of the active clue, looked up from the descriptor.
    pub fn current_clue_text(&self) -> Option<&str> {
        let number = self.current_clue_number()?;
        self.puzzle
            .as_ref()?
            .clue_text(self.direction == Direction::Across, number)
    }

    /// True iff every non-block cell's working value equals the solution
    /// exactly. Empty never counts as correct.
    pub fn is_complete(&self) -> bool {
        let Some(puzzle) = &self.puzzle else {
            return false;
        };

        for row in 0..puzzle.height() {
            for col in 0..puzzle.width() {
                match puzzle.solution_at(row, col) {
                    Some(SolutionCell::Block) => continue,
                    Some(SolutionCell::Letter(s)) => {
                        let value = self.value_at(row, col);
                        if value.is_empty() || value != s {
                            return false;
                        }
                    }
                    // A cell with no published solution can never be
                    // confirmed correct.
                    Some(SolutionCell::Absent) | None => return false,
                }
            }
        }
        true
    }

    /// First cell of the run containing `pos` along the active direction.
    fn run_start(&self, pos: CellPos) -> CellPos {
        let Some(puzzle) = &self.puzzle else {
            return pos;
        };
        let mut start = pos;
        match self.direction {
            Direction::Across => {
                while start.col > 0 && !puzzle.is_block(start.row, start.col - 1) {
                    start.col -= 1;
                }
            }
            Direction::Down => {
                while start.row > 0 && !puzzle.is_block(start.row - 1, start.col) {
                    start.row -= 1;
                }
            }
        }
        start
    }

    /// Nearest non-block cell strictly ahead of `pos` along the current
    /// direction, within grid bounds.
    fn next_cell(&self, pos: CellPos) -> Option<CellPos> {
        let puzzle = self.puzzle.as_ref()?;
        match self.direction {
            Direction::Across => ((pos.col + 1)..puzzle.width())
                .find(|&c| !puzzle.is_block(pos.row, c))
                .map(|c| CellPos::new(pos.row, c)),
            Direction::Down => ((pos.row + 1)..puzzle.height())
                .find(|&r| !puzzle.is_block(r, pos.col))
                .map(|r| CellPos::new(r, pos.col)),
        }
    }

    /// Nearest non-block cell strictly behind `pos` along the current
    /// direction.
    fn prev_cell(&self, pos: CellPos) -> Option<CellPos> {
        let puzzle = self.puzzle.as_ref()?;
        match self.direction {
            Direction::Across => (0..pos.col)
                .rev()
                .find(|&c| !puzzle.is_block(pos.row, c))
                .map(|c| CellPos::new(pos.row, c)),
            Direction::Down => (0..pos.row)
                .rev()
                .find(|&r| !puzzle.is_block(r, pos.col))
                .map(|r| CellPos::new(r, pos.col)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::tests::sample_descriptor;

    fn loaded_state() -> PuzzleState {
        let mut state = PuzzleState::new();
        state.load(sample_descriptor());
        state
    }

    #[test]
    fn load_mirrors_block_layout() {
        let state = loaded_state();
        assert_eq!(state.value_at(0, 0), "");
        assert_eq!(state.value_at(1, 1), "#");
        assert_eq!(state.selected_cell(), None);
        assert_eq!(state.direction(), Direction::Across);
    }

    #[test]
    fn select_block_is_noop() {
        let mut state = loaded_state();
        state.select(1, 1);
        assert_eq!(state.selected_cell(), None);
    }

    #[test]
    fn reselect_toggles_direction() {
        let mut state = loaded_state();
        state.select(0, 0);
        assert_eq!(state.direction(), Direction::Across);
        state.select(0, 0);
        assert_eq!(state.direction(), Direction::Down);
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 0)));
        state.select(0, 0);
        assert_eq!(state.direction(), Direction::Across);
    }

    #[test]
    fn enter_letter_advances_and_uppercases() {
        let mut state = loaded_state();
        state.select(0, 0);
        state.enter_letter('c');
        assert_eq!(state.value_at(0, 0), "C");
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 1)));
    }

    #[test]
    fn enter_letter_at_run_end_keeps_selection() {
        // Scenario D: no next cell exists past the last cell of the row.
        let mut state = loaded_state();
        state.select(0, 2);
        state.enter_letter('T');
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 2)));
    }

    #[test]
    fn enter_letter_skips_block_to_next_open_cell() {
        let mut state = loaded_state();
        state.select(1, 0);
        // Across from (1,0): (1,1) is a block, so nothing ahead until... the
        // scan finds (1,2) past the block.
        state.enter_letter('O');
        assert_eq!(state.selected_cell(), Some(CellPos::new(1, 2)));
    }

    #[test]
    fn backspace_clears_in_place_when_filled() {
        let mut state = loaded_state();
        state.select(0, 1);
        state.enter_letter('A');
        state.select(0, 1);
        state.clear_cell();
        assert_eq!(state.value_at(0, 1), "");
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 1)));
    }

    #[test]
    fn backspace_through_moves_back_and_clears() {
        let mut state = loaded_state();
        state.select(0, 0);
        state.enter_letter('C'); // selection advances to (0,1), still empty
        state.clear_cell();
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 0)));
        assert_eq!(state.value_at(0, 0), "");
    }

    #[test]
    fn backspace_at_run_start_with_empty_cell_is_noop() {
        let mut state = loaded_state();
        state.select(0, 0);
        state.clear_cell();
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 0)));
    }

    #[test]
    fn move_into_block_is_rejected() {
        // Scenario C: step right from (1,0) into the (1,1) block.
        let mut state = loaded_state();
        state.select(1, 0);
        state.move_selection(MoveDir::Right);
        assert_eq!(state.selected_cell(), Some(CellPos::new(1, 0)));
    }

    #[test]
    fn move_clamps_to_bounds() {
        let mut state = loaded_state();
        state.select(0, 0);
        state.move_selection(MoveDir::Up);
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 0)));
        state.move_selection(MoveDir::Left);
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 0)));
        state.move_selection(MoveDir::Down);
        assert_eq!(state.selected_cell(), Some(CellPos::new(1, 0)));
    }

    #[test]
    fn check_marks_exactly_the_mismatches() {
        let mut state = loaded_state();
        state.select(0, 0);
        state.enter_letter('C'); // correct
        state.enter_letter('X'); // wrong at (0,1)

        let incorrect = state.check_puzzle();
        assert_eq!(incorrect, vec![CellPos::new(0, 1)]);
        assert!(state.is_marked_incorrect(CellPos::new(0, 1)));
        assert!(!state.is_marked_incorrect(CellPos::new(0, 0)));
        // Empty cells are never marked.
        assert!(!state.is_marked_incorrect(CellPos::new(2, 2)));
    }

    #[test]
    fn typing_clears_incorrect_mark() {
        let mut state = loaded_state();
        state.select(0, 0);
        state.enter_letter('X');
        state.check_puzzle();
        assert!(state.is_marked_incorrect(CellPos::new(0, 0)));

        state.select(0, 0);
        state.enter_letter('C');
        assert!(!state.is_marked_incorrect(CellPos::new(0, 0)));
    }

    #[test]
    fn reveal_then_complete() {
        let mut state = loaded_state();
        assert!(!state.is_complete());
        state.reveal_puzzle();
        assert!(state.is_complete());
        assert!(state.incorrect_cells().is_empty());
    }

    #[test]
    fn empty_cell_never_counts_as_correct() {
        let mut state = loaded_state();
        state.reveal_puzzle();
        state.select(2, 2);
        state.clear_cell();
        assert!(!state.is_complete());
    }

    #[test]
    fn remote_change_leaves_selection_alone() {
        let mut state = loaded_state();
        state.select(0, 0);
        state.apply_remote_change(2, 2, "B");
        assert_eq!(state.value_at(2, 2), "B");
        assert_eq!(state.selected_cell(), Some(CellPos::new(0, 0)));
        assert_eq!(state.direction(), Direction::Across);
    }

    #[test]
    fn remote_change_out_of_bounds_is_dropped() {
        let mut state = loaded_state();
        state.apply_remote_change(9, 9, "Z");
        assert_eq!(state.value_at(9, 9), "");
    }

    #[test]
    fn current_word_across_and_down() {
        let mut state = loaded_state();
        state.select(0, 1);
        assert_eq!(
            state.current_word(),
            vec![CellPos::new(0, 0), CellPos::new(0, 1), CellPos::new(0, 2)]
        );

        state.set_direction(Direction::Down);
        state.select(1, 0);
        assert_eq!(
            state.current_word(),
            vec![CellPos::new(0, 0), CellPos::new(1, 0), CellPos::new(2, 0)]
        );
    }

    #[test]
    fn current_clue_number_uses_run_start() {
        let mut state = loaded_state();
        state.select(0, 1);
        assert_eq!(state.current_clue_number(), Some(1));
        assert_eq!(state.current_clue_text(), Some("Feline"));

        state.set_direction(Direction::Down);
        state.select(1, 2);
        assert_eq!(state.current_clue_number(), Some(2));
        assert_eq!(state.current_clue_text(), Some("Tangled mass"));
    }

    #[test]
    fn events_reach_multiple_subscribers() {
        let mut state = PuzzleState::new();
        let rx1 = state.subscribe();
        let rx2 = state.subscribe();
        state.load(sample_descriptor());
        state.select(0, 0);
        state.enter_letter('C');

        for rx in [&rx1, &rx2] {
            let events: Vec<_> = rx.try_iter().collect();
            assert!(events.contains(&StateEvent::Loaded));
            assert!(events.iter().any(|e| matches!(
                e,
                StateEvent::CellEdited { remote: false, .. }
            )));
        }
    }

    #[test]
    fn local_and_remote_edits_are_distinguishable() {
        let mut state = PuzzleState::new();
        state.load(sample_descriptor());
        let rx = state.subscribe();

        state.select(0, 0);
        state.enter_letter('C');
        state.apply_remote_change(2, 0, "W");

        let edits: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                StateEvent::CellEdited { pos, remote, .. } => Some((pos, remote)),
                _ => None,
            })
            .collect();
        assert_eq!(
            edits,
            vec![
                (CellPos::new(0, 0), false),
                (CellPos::new(2, 0), true)
            ]
        );
    }
}
