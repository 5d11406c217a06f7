//! Mock service errors

use thiserror::Error;

/// Errors loading mock data
#[derive(Debug, Error)]
pub enum MockServiceError {
    /// Recording or fixture file could not be read
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed line or document
    #[error("invalid data in '{path}' at line {line}: {message}")]
    InvalidData {
        path: String,
        line: usize,
        message: String,
    },
}

/// Result type for mock data loading
pub type Result<T> = std::result::Result<T, MockServiceError>;
