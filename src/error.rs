//! Custom error types for rustkscholar.
//!
//! Network, parse and upstream errors are values of [`ScholarError`]. The
//! search call sites turn them into "zero records" plus a log line; nothing
//! in the normalization or merge stages returns an error at all.

use thiserror::Error;

/// Main error type for rustkscholar operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// Network/HTTP request error (timeout, connection failure)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// XML or payload parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Upstream API returned a non-success status or an error code in its envelope
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status or upstream error code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<quick_xml::Error> for ScholarError {
    fn from(err: quick_xml::Error) -> Self {
        ScholarError::Parse(format!("XML: {}", err))
    }
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ScholarError::Parse(msg.to_string()))
    }
}
