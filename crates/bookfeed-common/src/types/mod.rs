//! Import surface types shared with catalog readers
//!
//! These are the values persisted on `import_logs` / `import_errors` and the
//! per-file result handed back to whoever triggered an import.

use crate::error::BookfeedError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Import Status
// ============================================================================

/// Lifecycle of one file-processing attempt.
///
/// `Processing` is the only in-flight state. `Completed` and `Failed` are
/// terminal: once an import log reaches either, it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ImportStatus::Processing => false,
            ImportStatus::Completed | ImportStatus::Failed => true,
        }
    }

    /// Check that `self -> next` is an allowed transition.
    pub fn transition_to(self, next: ImportStatus) -> crate::Result<ImportStatus> {
        match (self, next) {
            (ImportStatus::Processing, ImportStatus::Completed)
            | (ImportStatus::Processing, ImportStatus::Failed) => Ok(next),
            (from, to) => Err(BookfeedError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = BookfeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            _ => Err(BookfeedError::parse(format!("Invalid import status: {}", s))),
        }
    }
}

// ============================================================================
// Import Error Kind
// ============================================================================

/// Classification of an `import_errors` row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorKind {
    /// The feed document could not be parsed at all
    ParseError,
    /// A record failed because of a database error
    DatabaseError,
    /// A record failed for a non-database reason
    ImportError,
    /// The orchestrator itself failed outside the per-record boundary
    SystemError,
}

impl ImportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportErrorKind::ParseError => "parse_error",
            ImportErrorKind::DatabaseError => "database_error",
            ImportErrorKind::ImportError => "import_error",
            ImportErrorKind::SystemError => "system_error",
        }
    }
}

impl std::fmt::Display for ImportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImportErrorKind {
    type Err = BookfeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parse_error" => Ok(ImportErrorKind::ParseError),
            "database_error" => Ok(ImportErrorKind::DatabaseError),
            "import_error" => Ok(ImportErrorKind::ImportError),
            "system_error" => Ok(ImportErrorKind::SystemError),
            _ => Err(BookfeedError::parse(format!("Invalid import error type: {}", s))),
        }
    }
}

// ============================================================================
// Import Summary
// ============================================================================

/// Per-file result returned to callers of an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub success: bool,
    pub import_log_id: i64,
    pub total_books: i64,
    pub imported_books: i64,
    pub skipped_books: i64,
    pub error_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}
