//! Error types for the text layer.

use thiserror::Error;

/// Errors that can occur in text operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextError {
    #[error("Invalid position: {position} (length: {length})")]
    PositionOutOfBounds { position: usize, length: usize },

    #[error("Invalid range: {start}..{end} (length: {length})")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        length: usize,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for TextError {
    fn from(err: serde_json::Error) -> Self {
        TextError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TextError>;
