//! Error types for the ingestion pipeline

use crate::onix::FeedError;
use bookfeed_common::BookfeedError;
use thiserror::Error;

/// Result alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] BookfeedError),

    #[error("Import log {0} not found")]
    ImportLogNotFound(i64),
}

impl IngestError {
    /// True when the failure came from the database layer
    pub fn is_database(&self) -> bool {
        matches!(self, IngestError::Database(_) | IngestError::Migration(_))
    }
}
