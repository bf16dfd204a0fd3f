//! Append-only writer for `import_errors`

use crate::error::Result;
use bookfeed_common::types::ImportErrorKind;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::error;

/// A failure about to be recorded
#[derive(Debug, Clone)]
pub struct NewImportError<'a> {
    pub import_log_id: i64,
    pub kind: ImportErrorKind,
    pub message: &'a str,
    pub book_identifier: Option<&'a str>,
    pub details: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct ErrorSink {
    db: SqlitePool,
}

impl ErrorSink {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert one entry and return its id
    pub async fn record(&self, entry: &NewImportError<'_>) -> Result<i64> {
        let details = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let id = sqlx::query_scalar(
            "INSERT INTO import_errors \
             (import_log_id, book_identifier, error_type, error_message, error_details, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(entry.import_log_id)
        .bind(entry.book_identifier)
        .bind(entry.kind.as_str())
        .bind(entry.message)
        .bind(details)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(id)
    }

    /// Like [`ErrorSink::record`], but a failed write is only logged
    pub async fn report(&self, entry: NewImportError<'_>) {
        if let Err(err) = self.record(&entry).await {
            error!(
                import_log_id = entry.import_log_id,
                error_type = %entry.kind,
                message = entry.message,
                error = %err,
                "Failed to record import error"
            );
        }
    }
}
