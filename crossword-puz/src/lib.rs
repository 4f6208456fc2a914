//! # crossword-puz — Puzzle ingestion
//!
//! The `parse(bytes) -> PuzzleDescriptor` collaborator consumed by the
//! upload path: schema-checked iPUZ (JSON) with field-path errors, and the
//! legacy Across Lite `.puz` fixed-layout binary format. Stateless — this
//! crate never touches the collaborative core, which only ever sees the
//! resulting [`crossword_core::PuzzleDescriptor`].

pub mod error;
pub mod ipuz;
pub mod puz;

pub use error::ParseError;
pub use ipuz::{parse_ipuz, parse_ipuz_value};
pub use puz::{is_puz_file, parse_puz};

use crossword_core::PuzzleDescriptor;

/// Parse an uploaded puzzle file, sniffing the format: `.puz` binary when
/// the magic string is present, iPUZ JSON otherwise.
pub fn parse(bytes: &[u8]) -> Result<PuzzleDescriptor, ParseError> {
    if is_puz_file(bytes) {
        return parse_puz(bytes);
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| ParseError::Json(format!("not valid UTF-8: {e}")))?;
    parse_ipuz(text)
}
