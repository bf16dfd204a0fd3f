//! Candidate records produced by the feed parser

use serde::{Deserialize, Serialize};

/// ONIX notification type for a deletion notice
pub const NOTIFICATION_DELETE: &str = "05";

/// One book as described by a feed, before anything touches the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateBook {
    pub record_reference: Option<String>,
    pub notification_type: Option<String>,
    pub isbn13: Option<String>,
    pub isbn10: Option<String>,
    pub title: Option<String>,
    pub contributors: Vec<CandidateContributor>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    /// `YYYY-MM-DD` / `YYYY-MM` when the feed used ONIX basic date formats
    pub publication_date: Option<String>,
    pub keywords: Vec<String>,
    pub price: Option<String>,
    pub genre: Option<String>,
    pub cover_image_url: Option<String>,
}

/// A person or organization credited on a candidate book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateContributor {
    pub name: String,
    /// ONIX contributor role code, verbatim ("A01", "B01", ...)
    pub role: String,
    pub sequence_number: i64,
    pub biography: Option<String>,
}

impl CandidateBook {
    pub fn is_deletion(&self) -> bool {
        self.notification_type.as_deref() == Some(NOTIFICATION_DELETE)
    }

    /// First non-empty identifier, in ISBN-13 / ISBN-10 / record reference order
    pub fn identifier(&self) -> Option<&str> {
        [&self.isbn13, &self.isbn10, &self.record_reference]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|value| !value.is_empty())
    }
}
