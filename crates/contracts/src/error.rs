//! Layered error definitions
//!
//! Categorized by source: config / directory / location / delivery

use thiserror::Error;

/// Unified collaborator error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Directory Errors =====
    /// Remote user directory lookup failed
    #[error("directory lookup '{lookup}' failed for user '{user_id}': {message}")]
    Directory {
        lookup: &'static str,
        user_id: String,
        message: String,
    },

    // ===== Location Errors =====
    /// Position fix could not be obtained (permission, service off, timeout)
    #[error("position unavailable: {message}")]
    PositionUnavailable { message: String },

    /// Reverse geocode lookup failed
    #[error("reverse geocode failed for ({latitude}, {longitude}): {message}")]
    Geocode {
        latitude: f64,
        longitude: f64,
        message: String,
    },

    // ===== Delivery Errors =====
    /// Alert delivery channel error
    #[error("alert dispatch error: {message}")]
    Dispatch { message: String },

    /// Report sink write error
    #[error("report sink '{sink_name}' write error: {message}")]
    ReportWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create directory lookup error
    pub fn directory(
        lookup: &'static str,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Directory {
            lookup,
            user_id: user_id.into(),
            message: message.into(),
        }
    }

    /// Create position error
    pub fn position(message: impl Into<String>) -> Self {
        Self::PositionUnavailable {
            message: message.into(),
        }
    }

    /// Create reverse geocode error
    pub fn geocode(latitude: f64, longitude: f64, message: impl Into<String>) -> Self {
        Self::Geocode {
            latitude,
            longitude,
            message: message.into(),
        }
    }

    /// Create dispatch error
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Create report sink write error
    pub fn report_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReportWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
