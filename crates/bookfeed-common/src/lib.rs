//! Bookfeed Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the bookfeed workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`BookfeedError`] and the [`Result`] alias
//! - **Logging**: centralized `tracing` setup driven by [`logging::LogConfig`]
//! - **Types**: the import surface shared with collaborators that read the
//!   catalog (import status, error kinds, per-file summaries)
//!
//! # Example
//!
//! ```no_run
//! use bookfeed_common::types::ImportStatus;
//!
//! fn is_done(raw: &str) -> bookfeed_common::Result<bool> {
//!     let status: ImportStatus = raw.parse()?;
//!     Ok(status.is_terminal())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{BookfeedError, Result};
