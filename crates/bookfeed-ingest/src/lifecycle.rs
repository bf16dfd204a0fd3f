//! Import directory layout and the incoming-directory scan

use crate::config::ImportsConfig;
use crate::error::Result;
use crate::orchestrator::ImportOrchestrator;
use bookfeed_common::types::ImportSummary;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a feed file goes once its import is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Processed,
    Failed,
}

/// The incoming / processed / failed directory triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirectories {
    pub incoming: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
}

impl ImportDirectories {
    pub fn new(
        incoming: impl Into<PathBuf>,
        processed: impl Into<PathBuf>,
        failed: impl Into<PathBuf>,
    ) -> Self {
        Self {
            incoming: incoming.into(),
            processed: processed.into(),
            failed: failed.into(),
        }
    }

    pub fn from_config(config: &ImportsConfig) -> Self {
        Self::new(
            &config.incoming_dir,
            &config.processed_dir,
            &config.failed_dir,
        )
    }

    pub async fn ensure_exists(&self) -> io::Result<()> {
        for dir in [&self.incoming, &self.processed, &self.failed] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn target_dir(&self, destination: Destination) -> &Path {
        match destination {
            Destination::Processed => &self.processed,
            Destination::Failed => &self.failed,
        }
    }

    /// Move `path` into the destination directory, keeping its file name.
    ///
    /// On error the file stays where it was.
    pub async fn relocate(&self, path: &Path, destination: Destination) -> io::Result<PathBuf> {
        let name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })?;
        let target = self.target_dir(destination).join(name);

        tokio::fs::rename(path, &target).await?;
        debug!(from = %path.display(), to = %target.display(), "Moved feed file");

        Ok(target)
    }
}

/// True when `path` has one of `allowed` as its extension (case-insensitive)
pub fn has_allowed_extension(path: &Path, allowed: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Runs every eligible file in the incoming directory through the orchestrator
pub struct FileLifecycleManager {
    orchestrator: ImportOrchestrator,
    allowed_extensions: Vec<String>,
}

impl FileLifecycleManager {
    pub fn new(orchestrator: ImportOrchestrator, allowed_extensions: Vec<String>) -> Self {
        Self {
            orchestrator,
            allowed_extensions,
        }
    }

    pub fn orchestrator(&self) -> &ImportOrchestrator {
        &self.orchestrator
    }

    /// Regular files with an allowed extension, sorted by name
    pub async fn eligible_files(&self) -> Result<Vec<PathBuf>> {
        let incoming = &self.orchestrator.directories().incoming;
        let mut entries = tokio::fs::read_dir(incoming).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if has_allowed_extension(&path, &self.allowed_extensions) {
                files.push(path);
            } else {
                debug!(file = %path.display(), "Ignoring file with unsupported extension");
            }
        }

        files.sort();
        Ok(files)
    }

    /// Import every eligible file, one at a time, in name order
    pub async fn process_incoming(&self) -> Result<Vec<ImportSummary>> {
        let files = self.eligible_files().await?;
        info!(
            files = files.len(),
            incoming = %self.orchestrator.directories().incoming.display(),
            "Processing incoming feeds"
        );

        let mut results = Vec::with_capacity(files.len());
        for path in files {
            let summary = self.orchestrator.import_file(&path).await?;
            info!(
                file = %path.display(),
                imported = summary.imported_books,
                skipped = summary.skipped_books,
                errors = summary.error_count,
                "Finished feed file"
            );
            results.push(summary);
        }

        Ok(results)
    }
}
