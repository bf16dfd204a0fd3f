//! Error types shared across the bookfeed crates

use thiserror::Error;

/// Result type alias for bookfeed operations
pub type Result<T> = std::result::Result<T, BookfeedError>;

/// Main error type for bookfeed
#[derive(Error, Debug)]
pub enum BookfeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl BookfeedError {
    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
