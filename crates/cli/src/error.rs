//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Directory fixture could not be loaded
    #[error("Failed to load directory fixture: {0}")]
    Directory(#[from] mock_services::MockServiceError),

    /// Motion recording could not be loaded
    #[error("Failed to load motion recording {}: {message}", path.display())]
    Recording { path: PathBuf, message: String },

    /// Report file could not be opened
    #[error("Failed to open report file {}: {source}", path.display())]
    ReportFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid session option
    #[error("Invalid option: {message}")]
    InvalidOption { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }
}
