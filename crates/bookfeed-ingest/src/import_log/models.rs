//! Import audit rows

use bookfeed_common::types::{ImportErrorKind, ImportStatus};
use bookfeed_common::BookfeedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// One file-processing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLog {
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub import_source: String,
    pub status: ImportStatus,
    pub total_books: i64,
    pub imported_books: i64,
    pub skipped_books: i64,
    pub error_count: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One failure recorded against an import log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportErrorEntry {
    pub id: i64,
    pub import_log_id: i64,
    pub book_identifier: Option<String>,
    pub error_type: ImportErrorKind,
    pub error_message: String,
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An import log together with its error entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLogDetail {
    #[serde(flatten)]
    pub log: ImportLog,
    pub errors: Vec<ImportErrorEntry>,
}

/// Counts written when a log leaves `processing`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportCounts {
    pub total_books: i64,
    pub imported_books: i64,
    pub skipped_books: i64,
    pub error_count: i64,
}

fn decode_error(err: BookfeedError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

impl<'r> FromRow<'r, SqliteRow> for ImportLog {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            filepath: row.try_get("filepath")?,
            import_source: row.try_get("import_source")?,
            status: status.parse().map_err(decode_error)?,
            total_books: row.try_get("total_books")?,
            imported_books: row.try_get("imported_books")?,
            skipped_books: row.try_get("skipped_books")?,
            error_count: row.try_get("error_count")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for ImportErrorEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let error_type: String = row.try_get("error_type")?;
        let error_details: Option<String> = row.try_get("error_details")?;

        Ok(Self {
            id: row.try_get("id")?,
            import_log_id: row.try_get("import_log_id")?,
            book_identifier: row.try_get("book_identifier")?,
            error_type: error_type.parse().map_err(decode_error)?,
            error_message: row.try_get("error_message")?,
            // Details written by hand may not be JSON; keep them as a string
            error_details: error_details.map(|raw| {
                serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
            }),
            created_at: row.try_get("created_at")?,
        })
    }
}
