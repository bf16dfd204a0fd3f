//! Catalog writes: contributor/publisher resolution and book upserts

pub mod models;
pub mod resolver;
pub mod roles;
pub mod upsert;

pub use models::{Book, BookContributor, BookIdentity, Contributor, Publisher};
pub use resolver::{EntityResolver, ResolvedEntities};
pub use roles::role_label;
pub use upsert::{BookUpserter, RecordOutcome, SkipReason, UpsertAction, UNTITLED};
