//! Decoder for the legacy Across Lite `.puz` binary format.
//!
//! Fixed-layout header, then the solution grid, then the (ignored) player
//! state, then a latin-1 null-separated string table: title, author,
//! copyright, and the clues in numbering order. Clue numbers do not appear
//! in the file — they are reconstructed from block adjacency, with the
//! across clue preceding the down clue at a shared number.
//!
//! Format reference: the Across Lite file format wiki.

use crossword_core::{
    Clue, Clues, Dimensions, GridCell, PuzzleDescriptor, SolutionCell,
};

use crate::error::ParseError;

/// Header byte offsets.
mod header {
    pub const MAGIC: usize = 0x02; // 12 bytes: "ACROSS&DOWN\0"
    pub const WIDTH: usize = 0x2C; // 1 byte
    pub const HEIGHT: usize = 0x2D; // 1 byte
    pub const CLUE_COUNT: usize = 0x2E; // 2 bytes, little-endian
    pub const END: usize = 0x34; // solution grid starts here
}

const MAGIC_STRING: &[u8; 12] = b"ACROSS&DOWN\0";
const BLACK_CELL: u8 = b'.';

/// Check whether a buffer looks like a `.puz` file.
pub fn is_puz_file(bytes: &[u8]) -> bool {
    bytes.len() >= header::END
        && &bytes[header::MAGIC..header::MAGIC + MAGIC_STRING.len()] == MAGIC_STRING
}

/// Decode a `.puz` buffer into a [`PuzzleDescriptor`].
pub fn parse_puz(bytes: &[u8]) -> Result<PuzzleDescriptor, ParseError> {
    if bytes.len() < header::END {
        return Err(ParseError::Truncated {
            needed: header::END,
            actual: bytes.len(),
        });
    }
    if !is_puz_file(bytes) {
        return Err(ParseError::BadMagic);
    }

    let width = bytes[header::WIDTH] as usize;
    let height = bytes[header::HEIGHT] as usize;
    let clue_count =
        u16::from_le_bytes([bytes[header::CLUE_COUNT], bytes[header::CLUE_COUNT + 1]]) as usize;

    if width == 0 || height == 0 {
        return Err(ParseError::invalid(
            "dimensions",
            "width and height must be non-zero",
        ));
    }

    let grid_size = width * height;
    // Solution grid, then the player state grid we do not keep.
    let strings_start = header::END + 2 * grid_size;
    if bytes.len() < strings_start {
        return Err(ParseError::Truncated {
            needed: strings_start,
            actual: bytes.len(),
        });
    }
    let solution_bytes = &bytes[header::END..header::END + grid_size];

    let solution: Vec<Vec<SolutionCell>> = (0..height)
        .map(|row| {
            (0..width)
                .map(|col| {
                    let b = solution_bytes[row * width + col];
                    if b == BLACK_CELL {
                        SolutionCell::Block
                    } else {
                        SolutionCell::Letter(latin1(&[b]))
                    }
                })
                .collect()
        })
        .collect();

    // Title, author, copyright, then the clues.
    let strings = null_separated_strings(&bytes[strings_start..], clue_count + 3);
    let field = |i: usize| strings.get(i).cloned().unwrap_or_default();
    let title = strings
        .first()
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| "Untitled".to_string());
    let author = field(1);
    let copyright = field(2);
    let clue_strings: Vec<String> = strings
        .into_iter()
        .skip(3)
        .take(clue_count)
        .collect();

    let (grid, clues) = number_grid(width, height, &solution, &clue_strings);

    Ok(PuzzleDescriptor {
        dimensions: Dimensions { width, height },
        title: Some(title),
        author: non_empty(author),
        copyright: non_empty(copyright),
        notes: None,
        grid,
        solution,
        clues,
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Latin-1 decode: each byte maps to the code point of the same value.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Read up to `count` null-terminated latin-1 strings; a missing final
/// terminator yields the remaining bytes as the last string.
fn null_separated_strings(bytes: &[u8], count: usize) -> Vec<String> {
    let mut strings = Vec::with_capacity(count);
    let mut pos = 0;

    for _ in 0..count {
        if pos >= bytes.len() {
            break;
        }
        match bytes[pos..].iter().position(|&b| b == 0) {
            Some(end) => {
                strings.push(latin1(&bytes[pos..pos + end]));
                pos += end + 1;
            }
            None => {
                strings.push(latin1(&bytes[pos..]));
                break;
            }
        }
    }

    strings
}

/// Reconstruct cell numbering and clue association from block adjacency.
///
/// A cell is numbered when it starts an across- or down-run of length >= 2;
/// clue strings are consumed in number order, across before down when a
/// cell starts both.
fn number_grid(
    width: usize,
    height: usize,
    solution: &[Vec<SolutionCell>],
    clue_strings: &[String],
) -> (Vec<Vec<GridCell>>, Clues) {
    let is_black = |row: isize, col: isize| -> bool {
        if row < 0 || row >= height as isize || col < 0 || col >= width as isize {
            return true;
        }
        matches!(solution[row as usize][col as usize], SolutionCell::Block)
    };

    let mut grid = Vec::with_capacity(height);
    let mut across = Vec::new();
    let mut down = Vec::new();
    let mut cell_number = 1u32;
    let mut clue_index = 0usize;

    for row in 0..height as isize {
        let mut grid_row = Vec::with_capacity(width);
        for col in 0..width as isize {
            if is_black(row, col) {
                grid_row.push(GridCell::Block);
                continue;
            }

            let starts_across =
                (col == 0 || is_black(row, col - 1)) && !is_black(row, col + 1);
            let starts_down =
                (row == 0 || is_black(row - 1, col)) && !is_black(row + 1, col);

            if starts_across || starts_down {
                grid_row.push(GridCell::Number(cell_number));
                if starts_across {
                    if let Some(text) = clue_strings.get(clue_index) {
                        across.push(Clue(cell_number, text.clone()));
                        clue_index += 1;
                    }
                }
                if starts_down {
                    if let Some(text) = clue_strings.get(clue_index) {
                        down.push(Clue(cell_number, text.clone()));
                        clue_index += 1;
                    }
                }
                cell_number += 1;
            } else {
                grid_row.push(GridCell::Open);
            }
        }
        grid.push(grid_row);
    }

    (grid, Clues { across, down })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a minimal `.puz` buffer for the given solution rows.
    fn build_puz(rows: &[&str], strings: &[&str]) -> Vec<u8> {
        let height = rows.len();
        let width = rows[0].len();
        // Count clue strings: everything after title/author/copyright.
        let clue_count = strings.len().saturating_sub(3);

        let mut buf = vec![0u8; header::END];
        buf[header::MAGIC..header::MAGIC + 12].copy_from_slice(MAGIC_STRING);
        buf[header::WIDTH] = width as u8;
        buf[header::HEIGHT] = height as u8;
        buf[header::CLUE_COUNT..header::CLUE_COUNT + 2]
            .copy_from_slice(&(clue_count as u16).to_le_bytes());

        // Solution grid.
        for row in rows {
            buf.extend_from_slice(row.as_bytes());
        }
        // Player state: all dashes.
        buf.extend(std::iter::repeat(b'-').take(width * height));
        // String table.
        for s in strings {
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        buf
    }

    #[test]
    fn sniffs_magic() {
        let buf = build_puz(&["AB", "CD"], &["T", "A", "C", "1A", "1D", "2D"]);
        assert!(is_puz_file(&buf));
        assert!(!is_puz_file(b"not a puz file at all, honest"));
        assert!(!is_puz_file(&buf[..10]));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = build_puz(&["AB", "CD"], &["T", "A", "C", "1A", "1D", "2D"]);
        buf[header::MAGIC] = b'X';
        assert_eq!(parse_puz(&buf), Err(ParseError::BadMagic));
    }

    #[test]
    fn rejects_truncated_input() {
        let buf = build_puz(&["AB", "CD"], &["T", "A", "C", "1A", "1D", "2D"]);
        assert!(matches!(
            parse_puz(&buf[..header::END + 2]),
            Err(ParseError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let mut buf = build_puz(&["AB", "CD"], &["T", "A", "C", "1A", "1D", "2D"]);
        buf[header::WIDTH] = 0;
        assert!(matches!(
            parse_puz(&buf),
            Err(ParseError::Invalid { .. })
        ));
    }

    #[test]
    fn decodes_grid_and_metadata() {
        // CAT / O.E / WEB with a block in the middle.
        let buf = build_puz(
            &["CAT", "O.E", "WEB"],
            &[
                "Mini",
                "A. Setter",
                "(c) 2024",
                "Feline",       // 1 Across
                "Bovine",       // 1 Down
                "Tangled mass", // 2 Down
                "Spider's home", // 3 Across
            ],
        );

        let desc = parse_puz(&buf).unwrap();
        assert_eq!(desc.width(), 3);
        assert_eq!(desc.height(), 3);
        assert_eq!(desc.title.as_deref(), Some("Mini"));
        assert_eq!(desc.author.as_deref(), Some("A. Setter"));
        assert!(desc.is_block(1, 1));
        assert_eq!(
            desc.solution_at(0, 0),
            Some(&SolutionCell::Letter("C".to_string()))
        );
        desc.validate().unwrap();
    }

    #[test]
    fn reconstructs_numbering_from_block_adjacency() {
        let buf = build_puz(
            &["CAT", "O.E", "WEB"],
            &[
                "Mini",
                "",
                "",
                "Feline",
                "Bovine",
                "Tangled mass",
                "Spider's home",
            ],
        );
        let desc = parse_puz(&buf).unwrap();

        // (0,0) starts both runs -> 1; (0,2) starts a down run -> 2;
        // (2,0) starts an across run -> 3.
        assert_eq!(desc.number_at(0, 0), Some(1));
        assert_eq!(desc.number_at(0, 1), None);
        assert_eq!(desc.number_at(0, 2), Some(2));
        assert_eq!(desc.number_at(2, 0), Some(3));

        // Across clue consumed before down at a shared number.
        assert_eq!(
            desc.clues.across,
            vec![
                Clue(1, "Feline".to_string()),
                Clue(3, "Spider's home".to_string())
            ]
        );
        assert_eq!(
            desc.clues.down,
            vec![
                Clue(1, "Bovine".to_string()),
                Clue(2, "Tangled mass".to_string())
            ]
        );
    }

    #[test]
    fn missing_title_defaults() {
        let buf = build_puz(
            &["AB", "CD"],
            &["", "", "", "Top", "Left", "Right"],
        );
        let desc = parse_puz(&buf).unwrap();
        assert_eq!(desc.title.as_deref(), Some("Untitled"));
        assert_eq!(desc.author, None);
    }

    #[test]
    fn latin1_strings_survive() {
        let mut buf = build_puz(&["AB", "CD"], &["T", "A", "C", "1A", "1D", "2D"]);
        // Replace the title "T" (first string after the grids) with 0xE9
        // (e-acute in latin-1).
        let strings_start = header::END + 2 * 4;
        buf[strings_start] = 0xE9;
        let desc = parse_puz(&buf).unwrap();
        assert_eq!(desc.title.as_deref(), Some("é"));
    }
}
