// Import Log Storage
//
// Persists the per-file audit trail. A log is created in `processing` and
// finalized exactly once; the guarded UPDATE refuses to touch a log that has
// already reached a terminal status.

use crate::error::{IngestError, Result};
use crate::import_log::models::{ImportCounts, ImportErrorEntry, ImportLog, ImportLogDetail};
use bookfeed_common::types::ImportStatus;
use bookfeed_common::BookfeedError;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

const IMPORT_LOG_COLUMNS: &str = "id, filename, filepath, import_source, status, total_books, \
     imported_books, skipped_books, error_count, started_at, completed_at, created_at";

#[derive(Clone)]
pub struct ImportLogStore {
    db: SqlitePool,
}

impl ImportLogStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open a new log in `processing`
    pub async fn create(
        &self,
        filename: &str,
        filepath: &str,
        import_source: &str,
    ) -> Result<ImportLog> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO import_logs (filename, filepath, import_source, status, started_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
            IMPORT_LOG_COLUMNS
        );

        let log: ImportLog = sqlx::query_as(&sql)
            .bind(filename)
            .bind(filepath)
            .bind(import_source)
            .bind(ImportStatus::Processing.as_str())
            .bind(now)
            .bind(now)
            .fetch_one(&self.db)
            .await?;

        debug!(import_log_id = log.id, filename, "Created import log");
        Ok(log)
    }

    /// Move a log from `processing` to a terminal status and record its counts
    pub async fn finalize(
        &self,
        id: i64,
        status: ImportStatus,
        counts: ImportCounts,
    ) -> Result<ImportLog> {
        let current = self.get(id).await?.ok_or(IngestError::ImportLogNotFound(id))?;
        let status = current.status.transition_to(status)?;

        let sql = format!(
            "UPDATE import_logs \
             SET status = ?, total_books = ?, imported_books = ?, skipped_books = ?, \
                 error_count = ?, completed_at = ? \
             WHERE id = ? AND status = ? \
             RETURNING {}",
            IMPORT_LOG_COLUMNS
        );

        let updated: Option<ImportLog> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .bind(counts.total_books)
            .bind(counts.imported_books)
            .bind(counts.skipped_books)
            .bind(counts.error_count)
            .bind(Utc::now())
            .bind(id)
            .bind(ImportStatus::Processing.as_str())
            .fetch_optional(&self.db)
            .await?;

        // Someone else finalized it between the read and the update
        updated.ok_or_else(|| {
            IngestError::Common(BookfeedError::InvalidTransition {
                from: "finalized".to_string(),
                to: status.to_string(),
            })
        })
    }

    pub async fn get(&self, id: i64) -> Result<Option<ImportLog>> {
        let sql = format!("SELECT {} FROM import_logs WHERE id = ?", IMPORT_LOG_COLUMNS);

        let log = sqlx::query_as(&sql).bind(id).fetch_optional(&self.db).await?;
        Ok(log)
    }

    /// Most recent logs first
    pub async fn list(&self, limit: i64) -> Result<Vec<ImportLog>> {
        let sql = format!(
            "SELECT {} FROM import_logs ORDER BY created_at DESC, id DESC LIMIT ?",
            IMPORT_LOG_COLUMNS
        );

        let logs = sqlx::query_as(&sql).bind(limit).fetch_all(&self.db).await?;
        Ok(logs)
    }

    /// Error entries of one log, in the order they were written
    pub async fn errors_for(&self, import_log_id: i64) -> Result<Vec<ImportErrorEntry>> {
        let errors = sqlx::query_as(
            "SELECT id, import_log_id, book_identifier, error_type, error_message, error_details, created_at \
             FROM import_errors WHERE import_log_id = ? ORDER BY id",
        )
        .bind(import_log_id)
        .fetch_all(&self.db)
        .await?;

        Ok(errors)
    }

    /// A log with all of its errors
    pub async fn detail(&self, id: i64) -> Result<ImportLogDetail> {
        let log = self.get(id).await?.ok_or(IngestError::ImportLogNotFound(id))?;
        let errors = self.errors_for(id).await?;
        Ok(ImportLogDetail { log, errors })
    }
}
