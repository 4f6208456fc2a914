//! Structured ingestion errors: a field path plus a reason, so the upload
//! path can report exactly which part of a file was rejected.

use crossword_core::DescriptorError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input was not valid JSON.
    Json(String),
    /// A field failed schema validation. `path` is a dotted field path
    /// (e.g. `dimensions.width`).
    Invalid { path: String, reason: String },
    /// `.puz` magic string not found.
    BadMagic,
    /// `.puz` input shorter than a required section.
    Truncated { needed: usize, actual: usize },
    /// The assembled descriptor violates a structural invariant.
    Descriptor(DescriptorError),
}

impl ParseError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Json(e) => write!(f, "invalid JSON: {e}"),
            ParseError::Invalid { path, reason } => write!(f, "{path}: {reason}"),
            ParseError::BadMagic => write!(f, "invalid .puz file: magic string not found"),
            ParseError::Truncated { needed, actual } => {
                write!(f, "invalid .puz file: need {needed} bytes, have {actual}")
            }
            ParseError::Descriptor(e) => write!(f, "invalid puzzle: {e}"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<DescriptorError> for ParseError {
    fn from(e: DescriptorError) -> Self {
        ParseError::Descriptor(e)
    }
}
