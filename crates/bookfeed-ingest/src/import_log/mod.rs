//! Import history: one log per file attempt plus its error entries

pub mod error_sink;
pub mod models;
pub mod store;

pub use error_sink::{ErrorSink, NewImportError};
pub use models::{ImportCounts, ImportErrorEntry, ImportLog, ImportLogDetail};
pub use store::ImportLogStore;
