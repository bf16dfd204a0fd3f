//! ONIX feed reading
//!
//! Turns one feed file into an ordered list of [`CandidateBook`]s. Nothing in
//! this module touches the database.

pub mod models;
pub mod parser;
pub mod source;

pub use models::{CandidateBook, CandidateContributor};
pub use parser::{FeedError, OnixParser};
pub use source::detect_source;
