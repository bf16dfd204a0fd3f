// Import Orchestrator
//
// Drives one feed file end to end:
//
// 1. Open an import log (`processing`)
// 2. Parse the feed; a document error fails the file right away
// 3. Resolve contributors and publishers once for the whole file
// 4. Upsert records one at a time, folding outcomes into a tally
// 5. Finalize the log (`failed` only when every record failed)
// 6. Move the file to processed/ or failed/
//
// Anything that goes wrong outside the per-record boundary is recorded as a
// system error and fails the file.

use crate::catalog::{BookUpserter, EntityResolver, RecordOutcome};
use crate::config::PipelineConfig;
use crate::error::{IngestError, Result};
use crate::import_log::{ErrorSink, ImportCounts, ImportLogStore, NewImportError};
use crate::lifecycle::{Destination, ImportDirectories};
use crate::onix::{detect_source, OnixParser};
use bookfeed_common::types::{ImportErrorKind, ImportStatus, ImportSummary};
use serde_json::json;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{error, info, instrument, warn};

// ============================================================================
// Tally
// ============================================================================

/// Per-file record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportTally {
    pub total: i64,
    pub imported: i64,
    pub skipped: i64,
    pub errors: i64,
}

impl ImportTally {
    pub fn new(total: usize) -> Self {
        Self {
            total: total as i64,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Imported { .. } => self.imported += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
            RecordOutcome::Failed { .. } => self.errors += 1,
        }
    }

    /// A file fails only when every one of its records failed
    pub fn final_status(&self) -> ImportStatus {
        if self.errors == self.total {
            ImportStatus::Failed
        } else {
            ImportStatus::Completed
        }
    }

    pub fn counts(&self) -> ImportCounts {
        ImportCounts {
            total_books: self.total,
            imported_books: self.imported,
            skipped_books: self.skipped,
            error_count: self.errors,
        }
    }
}

/// What a run has done so far; survives a system error
#[derive(Debug, Default)]
struct RunProgress {
    tally: ImportTally,
    messages: Vec<String>,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct ImportOrchestrator {
    parser: OnixParser,
    resolver: EntityResolver,
    upserter: BookUpserter,
    logs: ImportLogStore,
    errors: ErrorSink,
    directories: ImportDirectories,
    progress_interval: usize,
}

impl ImportOrchestrator {
    pub fn new(db: SqlitePool, directories: ImportDirectories, pipeline: &PipelineConfig) -> Self {
        let errors = ErrorSink::new(db.clone());

        Self {
            parser: OnixParser::new(),
            resolver: EntityResolver::new(db.clone(), pipeline.lookup_chunk_size),
            upserter: BookUpserter::new(db.clone(), errors.clone()),
            logs: ImportLogStore::new(db),
            errors,
            directories,
            progress_interval: pipeline.progress_interval.max(1),
        }
    }

    pub fn directories(&self) -> &ImportDirectories {
        &self.directories
    }

    pub fn logs(&self) -> &ImportLogStore {
        &self.logs
    }

    /// Import one feed file.
    ///
    /// Only a failure to open the import log is returned as an error; every
    /// other failure is recorded on the log and reported in the summary.
    #[instrument(skip(self, path), fields(file = %file_name(path)))]
    pub async fn import_file(&self, path: &Path) -> Result<ImportSummary> {
        let filename = file_name(path);
        let filepath = path.display().to_string();

        let log = self
            .logs
            .create(&filename, &filepath, detect_source(&filename))
            .await?;
        info!(import_log_id = log.id, source = %log.import_source, "Import started");

        let mut progress = RunProgress::default();
        match self.run(path, &filename, log.id, &mut progress).await {
            Ok(summary) => Ok(summary),
            Err(err) => Ok(self.abort(path, &filename, log.id, progress, err).await),
        }
    }

    async fn run(
        &self,
        path: &Path,
        filename: &str,
        import_log_id: i64,
        progress: &mut RunProgress,
    ) -> Result<ImportSummary> {
        info!("Step 1/4: Parsing feed");
        let candidates = match self.parser.parse(path).await {
            Ok(candidates) => candidates,
            Err(err) => {
                return self
                    .fail_parse(path, filename, import_log_id, &err.to_string())
                    .await
            },
        };
        info!(records = candidates.len(), "Parsed feed");

        info!("Step 2/4: Resolving contributors and publishers");
        let entities = self.resolver.resolve(&candidates).await?;

        info!("Step 3/4: Importing records");
        progress.tally = ImportTally::new(candidates.len());
        let total = candidates.len();

        for (index, candidate) in candidates.iter().enumerate() {
            let outcome = self.upserter.upsert(candidate, &entities, import_log_id).await;
            progress.tally.record(&outcome);
            if let RecordOutcome::Failed { message, .. } = outcome {
                progress.messages.push(message);
            }

            let done = index + 1;
            if done % self.progress_interval == 0 || done == total {
                info!(
                    done,
                    total,
                    imported = progress.tally.imported,
                    skipped = progress.tally.skipped,
                    errors = progress.tally.errors,
                    "Import progress"
                );
            }
        }

        info!("Step 4/4: Finalizing");
        let tally = progress.tally;
        let status = tally.final_status();
        self.logs
            .finalize(import_log_id, status, tally.counts())
            .await?;

        let destination = match status {
            ImportStatus::Failed => Destination::Failed,
            ImportStatus::Completed | ImportStatus::Processing => Destination::Processed,
        };
        self.move_file(path, destination).await;

        info!(
            import_log_id,
            %status,
            total = tally.total,
            imported = tally.imported,
            skipped = tally.skipped,
            errors = tally.errors,
            "Import finished"
        );

        Ok(ImportSummary {
            success: status == ImportStatus::Completed,
            import_log_id,
            total_books: tally.total,
            imported_books: tally.imported,
            skipped_books: tally.skipped,
            error_count: tally.errors,
            errors: non_empty(std::mem::take(&mut progress.messages)),
        })
    }

    /// The feed could not be read as a document: nothing is imported
    async fn fail_parse(
        &self,
        path: &Path,
        filename: &str,
        import_log_id: i64,
        message: &str,
    ) -> Result<ImportSummary> {
        warn!(import_log_id, error = message, "Feed rejected");

        self.errors
            .report(NewImportError {
                import_log_id,
                kind: ImportErrorKind::ParseError,
                message,
                book_identifier: None,
                details: Some(json!({ "filepath": path.display().to_string(), "filename": filename })),
            })
            .await;

        let counts = ImportCounts {
            error_count: 1,
            ..ImportCounts::default()
        };
        self.logs
            .finalize(import_log_id, ImportStatus::Failed, counts)
            .await?;
        self.move_file(path, Destination::Failed).await;

        Ok(ImportSummary {
            success: false,
            import_log_id,
            total_books: 0,
            imported_books: 0,
            skipped_books: 0,
            error_count: 1,
            errors: Some(vec![message.to_string()]),
        })
    }

    /// Record a system error, fail the log and move the file aside
    async fn abort(
        &self,
        path: &Path,
        filename: &str,
        import_log_id: i64,
        progress: RunProgress,
        err: IngestError,
    ) -> ImportSummary {
        let message = err.to_string();
        error!(import_log_id, error = %err, "Import aborted");

        self.errors
            .report(NewImportError {
                import_log_id,
                kind: ImportErrorKind::SystemError,
                message: &message,
                book_identifier: None,
                details: Some(json!({ "filepath": path.display().to_string(), "filename": filename })),
            })
            .await;

        // The file total is unknown once the run broke off
        let counts = ImportCounts {
            total_books: 0,
            imported_books: progress.tally.imported,
            skipped_books: progress.tally.skipped,
            error_count: progress.tally.errors + 1,
        };
        if let Err(finalize_err) = self
            .logs
            .finalize(import_log_id, ImportStatus::Failed, counts)
            .await
        {
            error!(import_log_id, error = %finalize_err, "Failed to finalize import log");
        }
        self.move_file(path, Destination::Failed).await;

        let mut messages = progress.messages;
        messages.push(message);

        ImportSummary {
            success: false,
            import_log_id,
            total_books: counts.total_books,
            imported_books: counts.imported_books,
            skipped_books: counts.skipped_books,
            error_count: counts.error_count,
            errors: Some(messages),
        }
    }

    /// A failed move leaves the file in place and is only logged
    async fn move_file(&self, path: &Path, destination: Destination) {
        if let Err(err) = self.directories.relocate(path, destination).await {
            error!(
                file = %path.display(),
                ?destination,
                error = %err,
                "Failed to move feed file"
            );
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn non_empty(messages: Vec<String>) -> Option<Vec<String>> {
    if messages.is_empty() {
        None
    } else {
        Some(messages)
    }
}
