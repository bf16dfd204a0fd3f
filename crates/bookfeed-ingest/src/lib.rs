//! Bookfeed Ingest Library
//!
//! Imports ONIX book feeds into the SQLite catalog.
//!
//! # Pipeline
//!
//! - **onix**: reads a feed file into candidate book records
//! - **catalog**: resolves contributors/publishers and upserts books
//! - **import_log**: import history and per-record error entries
//! - **orchestrator**: runs one file end to end
//! - **lifecycle**: incoming/processed/failed directories and the incoming scan
//!
//! # Example
//!
//! ```no_run
//! use bookfeed_ingest::{config::IngestConfig, db, lifecycle::ImportDirectories};
//! use bookfeed_ingest::orchestrator::ImportOrchestrator;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let dirs = ImportDirectories::from_config(&config.imports);
//!     dirs.ensure_exists().await?;
//!
//!     let orchestrator = ImportOrchestrator::new(pool, dirs, &config.pipeline);
//!     let summary = orchestrator.import_file(Path::new("./imports/incoming/daily.xml")).await?;
//!     println!("imported {} books", summary.imported_books);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod import_log;
pub mod lifecycle;
pub mod onix;
pub mod orchestrator;

pub use error::{IngestError, Result};
pub use lifecycle::FileLifecycleManager;
pub use orchestrator::{ImportOrchestrator, ImportTally};
