//! Error types for history store operations

use std::fmt;

/// Result type alias for history store operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors that can occur while opening or appending to a history ring
#[derive(Debug)]
pub enum HistoryError {
    /// I/O error (file access, etc.)
    Io(std::io::Error),

    /// The backing file is not a history ring or is damaged beyond the
    /// torn-tail case
    Corrupt(String),

    /// The file or a committed record carries a version this build does
    /// not understand
    UnsupportedVersion(u16),

    /// Record serialization/deserialization error
    Serialization(String),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Io(err) => write!(f, "I/O error: {}", err),
            HistoryError::Corrupt(msg) => write!(f, "history file corrupt: {}", msg),
            HistoryError::UnsupportedVersion(version) => {
                write!(f, "unsupported history format version {}", version)
            }
            HistoryError::Serialization(msg) => {
                write!(f, "record serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HistoryError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HistoryError {
    fn from(err: std::io::Error) -> Self {
        HistoryError::Io(err)
    }
}

impl From<bincode::Error> for HistoryError {
    fn from(err: bincode::Error) -> Self {
        HistoryError::Serialization(err.to_string())
    }
}
