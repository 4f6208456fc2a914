//! Schema-checked iPUZ (JSON) crossword parsing.
//!
//! Implements the core subset of the iPUZ v2 specification needed for
//! American crosswords: exact version literal, a crossword `kind`,
//! dimensions up to 30x30, a numbering grid, a solution grid, and
//! `[number, text]` clue tuples. Styled-cell objects collapse to their
//! `cell` value. Every rejection carries the offending field path.

use crossword_core::{
    Clue, Clues, Dimensions, GridCell, PuzzleDescriptor, SolutionCell,
};
use serde_json::Value;

use crate::error::ParseError;

const IPUZ_VERSION: &str = "http://ipuz.org/v2";
const CROSSWORD_KIND_PREFIX: &str = "http://ipuz.org/crossword";
const MAX_DIMENSION: usize = 30;

/// Parse and validate an iPUZ document from JSON text.
pub fn parse_ipuz(input: &str) -> Result<PuzzleDescriptor, ParseError> {
    let value: Value =
        serde_json::from_str(input).map_err(|e| ParseError::Json(e.to_string()))?;
    parse_ipuz_value(&value)
}

/// Parse and validate an already-decoded JSON value.
pub fn parse_ipuz_value(value: &Value) -> Result<PuzzleDescriptor, ParseError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::invalid("", "expected a JSON object"))?;

    let version = require_str(obj, "version")?;
    if version != IPUZ_VERSION {
        return Err(ParseError::invalid(
            "version",
            format!("must be {IPUZ_VERSION:?}, got {version:?}"),
        ));
    }

    let kind = obj
        .get("kind")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::invalid("kind", "expected an array of strings"))?;
    let is_crossword = kind
        .iter()
        .filter_map(Value::as_str)
        .any(|k| k.starts_with(CROSSWORD_KIND_PREFIX));
    if !is_crossword {
        return Err(ParseError::invalid(
            "kind",
            format!("must include a crossword type ({CROSSWORD_KIND_PREFIX})"),
        ));
    }

    let dimensions = parse_dimensions(obj.get("dimensions"))?;
    let grid = parse_grid(obj.get("puzzle"), "puzzle")?;
    let solution = parse_solution(obj.get("solution"), "solution")?;
    let clues = parse_clues(obj.get("clues"))?;

    check_dims(&grid, dimensions, "puzzle")?;
    check_dims(&solution, dimensions, "solution")?;

    let descriptor = PuzzleDescriptor {
        dimensions,
        title: optional_str(obj, "title"),
        author: optional_str(obj, "author"),
        copyright: optional_str(obj, "copyright"),
        notes: optional_str(obj, "notes"),
        grid,
        solution,
        clues,
    };
    descriptor.validate()?;
    Ok(descriptor)
}

fn require_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'a str, ParseError> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::invalid(key, "expected a string"))
}

fn optional_str(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_dimensions(value: Option<&Value>) -> Result<Dimensions, ParseError> {
    let obj = value
        .and_then(Value::as_object)
        .ok_or_else(|| ParseError::invalid("dimensions", "expected an object"))?;

    let dim = |key: &str| -> Result<usize, ParseError> {
        let path = format!("dimensions.{key}");
        let n = obj
            .get(key)
            .and_then(Value::as_u64)
            .ok_or_else(|| ParseError::invalid(&path, "expected a positive integer"))?;
        let n = n as usize;
        if n == 0 || n > MAX_DIMENSION {
            return Err(ParseError::invalid(
                &path,
                format!("must be between 1 and {MAX_DIMENSION}"),
            ));
        }
        Ok(n)
    };

    Ok(Dimensions {
        width: dim("width")?,
        height: dim("height")?,
    })
}

fn parse_grid(value: Option<&Value>, path: &str) -> Result<Vec<Vec<GridCell>>, ParseError> {
    let rows = value
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::invalid(path, "expected an array of rows"))?;

    rows.iter()
        .enumerate()
        .map(|(r, row)| {
            let cells = row
                .as_array()
                .ok_or_else(|| ParseError::invalid(format!("{path}.{r}"), "expected an array"))?;
            cells
                .iter()
                .enumerate()
                .map(|(c, cell)| parse_grid_cell(cell, &format!("{path}.{r}.{c}")))
                .collect()
        })
        .collect()
}

fn parse_grid_cell(value: &Value, path: &str) -> Result<GridCell, ParseError> {
    // Styled cells are objects carrying the real value under "cell".
    let value = match value {
        Value::Object(obj) => obj
            .get("cell")
            .ok_or_else(|| ParseError::invalid(path, "styled cell missing \"cell\""))?,
        other => other,
    };

    match value {
        Value::Number(n) => match n.as_u64() {
            Some(0) => Ok(GridCell::Open),
            Some(n) if n <= u64::from(u32::MAX) => Ok(GridCell::Number(n as u32)),
            _ => Err(ParseError::invalid(path, "expected a non-negative integer")),
        },
        Value::String(s) if s == "#" => Ok(GridCell::Block),
        _ => Err(ParseError::invalid(
            path,
            "expected a clue number, 0, or \"#\"",
        )),
    }
}

fn parse_solution(
    value: Option<&Value>,
    path: &str,
) -> Result<Vec<Vec<SolutionCell>>, ParseError> {
    let rows = value
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::invalid(path, "expected an array of rows"))?;

    rows.iter()
        .enumerate()
        .map(|(r, row)| {
            let cells = row
                .as_array()
                .ok_or_else(|| ParseError::invalid(format!("{path}.{r}"), "expected an array"))?;
            cells
                .iter()
                .enumerate()
                .map(|(c, cell)| match cell {
                    Value::String(s) if s == "#" => Ok(SolutionCell::Block),
                    Value::String(s) => Ok(SolutionCell::Letter(s.clone())),
                    Value::Null => Ok(SolutionCell::Absent),
                    _ => Err(ParseError::invalid(
                        format!("{path}.{r}.{c}"),
                        "expected a letter string, \"#\", or null",
                    )),
                })
                .collect()
        })
        .collect()
}

fn parse_clues(value: Option<&Value>) -> Result<Clues, ParseError> {
    let obj = value
        .and_then(Value::as_object)
        .ok_or_else(|| ParseError::invalid("clues", "expected an object"))?;

    let list = |key: &str| -> Result<Vec<Clue>, ParseError> {
        let path = format!("clues.{key}");
        let entries = obj
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::invalid(&path, "expected an array"))?;

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let pair = entry.as_array().filter(|a| a.len() == 2).ok_or_else(|| {
                    ParseError::invalid(format!("{path}.{i}"), "expected [number, text]")
                })?;
                let number = pair[0].as_u64().filter(|&n| n > 0).ok_or_else(|| {
                    ParseError::invalid(format!("{path}.{i}.0"), "expected a positive integer")
                })?;
                let text = pair[1].as_str().ok_or_else(|| {
                    ParseError::invalid(format!("{path}.{i}.1"), "expected a string")
                })?;
                Ok(Clue(number as u32, text.to_string()))
            })
            .collect()
    };

    Ok(Clues {
        across: list("Across")?,
        down: list("Down")?,
    })
}

fn check_dims<T>(rows: &[Vec<T>], dims: Dimensions, path: &str) -> Result<(), ParseError> {
    if rows.len() != dims.height {
        return Err(ParseError::invalid(
            path,
            format!(
                "grid height ({}) does not match dimensions.height ({})",
                rows.len(),
                dims.height
            ),
        ));
    }
    if let Some(row) = rows.iter().find(|row| row.len() != dims.width) {
        return Err(ParseError::invalid(
            path,
            format!(
                "grid width ({}) does not match dimensions.width ({})",
                row.len(),
                dims.width
            ),
        ));
    }
    Ok(())
}
