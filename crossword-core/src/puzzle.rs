//! Immutable puzzle description: dimensions, numbering, solution, clues.
//!
//! The serde representation matches the iPUZ grid encoding so descriptors
//! produced by the ingestion path round-trip through JSON unchanged: a grid
//! cell is a clue number, `0` for an unnumbered open cell, or `"#"` for a
//! block; a solution cell is a letter string, `"#"`, or `null`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One cell of the numbering grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridCell {
    /// Cell carrying a clue number (start of at least one run).
    Number(u32),
    /// Open cell without a number (continuation of a run).
    Open,
    /// Block — cannot hold a letter.
    Block,
}

impl GridCell {
    pub fn is_block(&self) -> bool {
        matches!(self, GridCell::Block)
    }

    /// The clue number, if this cell carries one.
    pub fn number(&self) -> Option<u32> {
        match self {
            GridCell::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl Serialize for GridCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GridCell::Number(n) => serializer.serialize_u32(*n),
            GridCell::Open => serializer.serialize_u32(0),
            GridCell::Block => serializer.serialize_str("#"),
        }
    }
}

struct GridCellVisitor;

impl<'de> Visitor<'de> for GridCellVisitor {
    type Value = GridCell;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a non-negative integer or \"#\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<GridCell, E> {
        if v == 0 {
            Ok(GridCell::Open)
        } else if v <= u64::from(u32::MAX) {
            Ok(GridCell::Number(v as u32))
        } else {
            Err(E::custom(format!("clue number {v} out of range")))
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<GridCell, E> {
        if v < 0 {
            return Err(E::custom(format!("negative grid cell {v}")));
        }
        self.visit_u64(v as u64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<GridCell, E> {
        if v == "#" {
            Ok(GridCell::Block)
        } else {
            Err(E::custom(format!("unexpected grid cell string {v:?}")))
        }
    }
}

impl<'de> Deserialize<'de> for GridCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(GridCellVisitor)
    }
}

/// One cell of the solution grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolutionCell {
    /// Solution letters — more than one character for a rebus cell.
    Letter(String),
    /// Block.
    Block,
    /// No solution provided for this cell.
    Absent,
}

impl SolutionCell {
    /// The letters of this cell, if any.
    pub fn letters(&self) -> Option<&str> {
        match self {
            SolutionCell::Letter(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for SolutionCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SolutionCell::Letter(s) => serializer.serialize_str(s),
            SolutionCell::Block => serializer.serialize_str("#"),
            SolutionCell::Absent => serializer.serialize_none(),
        }
    }
}

struct SolutionCellVisitor;

impl<'de> Visitor<'de> for SolutionCellVisitor {
    type Value = SolutionCell;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a letter string, \"#\", or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<SolutionCell, E> {
        if v == "#" {
            Ok(SolutionCell::Block)
        } else {
            Ok(SolutionCell::Letter(v.to_string()))
        }
    }

    fn visit_unit<E: de::Error>(self) -> Result<SolutionCell, E> {
        Ok(SolutionCell::Absent)
    }

    fn visit_none<E: de::Error>(self) -> Result<SolutionCell, E> {
        Ok(SolutionCell::Absent)
    }
}

impl<'de> Deserialize<'de> for SolutionCell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SolutionCellVisitor)
    }
}

/// Grid dimensions. Non-square grids are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
}

/// A single clue: `[number, text]` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clue(pub u32, pub String);

impl Clue {
    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn text(&self) -> &str {
        &self.1
    }
}

/// Clue lists for both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clues {
    #[serde(rename = "Across")]
    pub across: Vec<Clue>,
    #[serde(rename = "Down")]
    pub down: Vec<Clue>,
}

/// Immutable description of one puzzle.
///
/// Produced once by the ingestion path and read-only thereafter. All state
/// machines and relays for the same puzzle id share one descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleDescriptor {
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub grid: Vec<Vec<GridCell>>,
    pub solution: Vec<Vec<SolutionCell>>,
    pub clues: Clues,
}

/// Structural invariant violations in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// A grid's row count or a row's cell count disagrees with `dimensions`.
    DimensionMismatch {
        grid: &'static str,
        expected: Dimensions,
    },
    /// Grid and solution disagree about where the blocks are.
    BlockMismatch { row: usize, col: usize },
    /// A numbered cell starts no across- or down-run of length >= 2.
    ShortRun { row: usize, col: usize, number: u32 },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::DimensionMismatch { grid, expected } => write!(
                f,
                "{grid} grid does not match dimensions {}x{}",
                expected.width, expected.height
            ),
            DescriptorError::BlockMismatch { row, col } => {
                write!(f, "grid and solution disagree on block at ({row},{col})")
            }
            DescriptorError::ShortRun { row, col, number } => write!(
                f,
                "numbered cell {number} at ({row},{col}) starts no run of length >= 2"
            ),
        }
    }
}

impl std::error::Error for DescriptorError {}

impl PuzzleDescriptor {
    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.height() && col < self.width()
    }

    /// Out-of-bounds coordinates count as blocked, which makes run scans
    /// terminate naturally at the edges.
    pub fn is_block(&self, row: usize, col: usize) -> bool {
        match self.grid.get(row).and_then(|r| r.get(col)) {
            Some(cell) => cell.is_block(),
            None => true,
        }
    }

    /// Clue number carried by a cell, if any.
    pub fn number_at(&self, row: usize, col: usize) -> Option<u32> {
        self.grid.get(row)?.get(col)?.number()
    }

    pub fn solution_at(&self, row: usize, col: usize) -> Option<&SolutionCell> {
        self.solution.get(row)?.get(col)
    }

    /// Look up clue text by direction and number.
    pub fn clue_text(&self, across: bool, number: u32) -> Option<&str> {
        let list = if across {
            &self.clues.across
        } else {
            &self.clues.down
        };
        list.iter()
            .find(|c| c.number() == number)
            .map(|c| c.text())
    }

    /// Check the structural invariants: exact dimensions, agreeing block
    /// layouts, and every numbered cell starting a run of length >= 2.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let dims = self.dimensions;
        if self.grid.len() != dims.height || self.grid.iter().any(|r| r.len() != dims.width) {
            return Err(DescriptorError::DimensionMismatch {
                grid: "puzzle",
                expected: dims,
            });
        }
        if self.solution.len() != dims.height
            || self.solution.iter().any(|r| r.len() != dims.width)
        {
            return Err(DescriptorError::DimensionMismatch {
                grid: "solution",
                expected: dims,
            });
        }

        for row in 0..dims.height {
            for col in 0..dims.width {
                let grid_block = self.grid[row][col].is_block();
                let sol_block = matches!(self.solution[row][col], SolutionCell::Block);
                if grid_block != sol_block {
                    return Err(DescriptorError::BlockMismatch { row, col });
                }

                if let Some(number) = self.grid[row][col].number() {
                    let starts_across = (col == 0 || self.is_block(row, col.wrapping_sub(1)))
                        && !self.is_block(row, col + 1);
                    let starts_down = (row == 0 || self.is_block(row.wrapping_sub(1), col))
                        && !self.is_block(row + 1, col);
                    if !starts_across && !starts_down {
                        return Err(DescriptorError::ShortRun { row, col, number });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 3x3 descriptor with a block at (1,1):
    /// ```text
    /// C A T
    /// O # E
    /// W E B
    /// ```
    pub(crate) fn sample_descriptor() -> PuzzleDescriptor {
        let n = GridCell::Number;
        let o = GridCell::Open;
        let b = GridCell::Block;
        let l = |s: &str| SolutionCell::Letter(s.to_string());

        PuzzleDescriptor {
            dimensions: Dimensions {
                width: 3,
                height: 3,
            },
            title: Some("Sample".to_string()),
            author: None,
            copyright: None,
            notes: None,
            grid: vec![
                vec![n(1), o, n(2)],
                vec![o, b, o],
                vec![n(3), o, o],
            ],
            solution: vec![
                vec![l("C"), l("A"), l("T")],
                vec![l("O"), SolutionCell::Block, l("E")],
                vec![l("W"), l("E"), l("B")],
            ],
            clues: Clues {
                across: vec![
                    Clue(1, "Feline".to_string()),
                    Clue(3, "Spider's home".to_string()),
                ],
                down: vec![
                    Clue(1, "Bovine".to_string()),
                    Clue(2, "Tangled mass".to_string()),
                ],
            },
        }
    }

    #[test]
    fn grid_cell_serde_forms() {
        let json = serde_json::to_string(&vec![GridCell::Number(3), GridCell::Open, GridCell::Block])
            .unwrap();
        assert_eq!(json, r##"[3,0,"#"]"##);

        let cells: Vec<GridCell> = serde_json::from_str(r##"[1,0,"#"]"##).unwrap();
        assert_eq!(
            cells,
            vec![GridCell::Number(1), GridCell::Open, GridCell::Block]
        );
    }

    #[test]
    fn grid_cell_rejects_garbage() {
        assert!(serde_json::from_str::<GridCell>(r#""X""#).is_err());
        assert!(serde_json::from_str::<GridCell>("-1").is_err());
    }

    #[test]
    fn solution_cell_serde_forms() {
        let cells: Vec<SolutionCell> = serde_json::from_str(r##"["A","#",null,"QU"]"##).unwrap();
        assert_eq!(
            cells,
            vec![
                SolutionCell::Letter("A".to_string()),
                SolutionCell::Block,
                SolutionCell::Absent,
                SolutionCell::Letter("QU".to_string()),
            ]
        );

        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r##"["A","#",null,"QU"]"##);
    }

    #[test]
    fn clue_serializes_as_tuple() {
        let clue = Clue(7, "Greek letter".to_string());
        assert_eq!(
            serde_json::to_string(&clue).unwrap(),
            r#"[7,"Greek letter"]"#
        );
    }

    #[test]
    fn descriptor_roundtrip() {
        let desc = sample_descriptor();
        let json = serde_json::to_string(&desc).unwrap();
        let back: PuzzleDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, back);
    }

    #[test]
    fn sample_descriptor_validates() {
        sample_descriptor().validate().unwrap();
    }

    #[test]
    fn validate_rejects_dimension_mismatch() {
        let mut desc = sample_descriptor();
        desc.grid.pop();
        assert!(matches!(
            desc.validate(),
            Err(DescriptorError::DimensionMismatch { grid: "puzzle", .. })
        ));
    }

    #[test]
    fn validate_rejects_block_disagreement() {
        let mut desc = sample_descriptor();
        desc.solution[0][0] = SolutionCell::Block;
        assert_eq!(
            desc.validate(),
            Err(DescriptorError::BlockMismatch { row: 0, col: 0 })
        );
    }

    #[test]
    fn validate_rejects_isolated_number() {
        // 1x1 grid: the single numbered cell cannot start any run.
        let desc = PuzzleDescriptor {
            dimensions: Dimensions {
                width: 1,
                height: 1,
            },
            title: None,
            author: None,
            copyright: None,
            notes: None,
            grid: vec![vec![GridCell::Number(1)]],
            solution: vec![vec![SolutionCell::Letter("A".to_string())]],
            clues: Clues::default(),
        };
        assert_eq!(
            desc.validate(),
            Err(DescriptorError::ShortRun {
                row: 0,
                col: 0,
                number: 1
            })
        );
    }

    #[test]
    fn block_lookup_clamps_out_of_bounds() {
        let desc = sample_descriptor();
        assert!(desc.is_block(1, 1));
        assert!(desc.is_block(3, 0));
        assert!(desc.is_block(0, 99));
        assert!(!desc.is_block(0, 0));
    }

    #[test]
    fn clue_text_lookup() {
        let desc = sample_descriptor();
        assert_eq!(desc.clue_text(true, 1), Some("Feline"));
        assert_eq!(desc.clue_text(false, 2), Some("Tangled mass"));
        assert_eq!(desc.clue_text(false, 3), None);
    }
}
