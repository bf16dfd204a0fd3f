//! Catalog row types and book identity

use crate::onix::CandidateBook;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    /// Contributor ids in credit order
    pub contributor_ids: Json<Vec<i64>>,
    pub publisher_id: Option<i64>,
    pub description: Option<String>,
    /// ISBN-13 when the feed had one, otherwise ISBN-10
    pub isbn: Option<String>,
    /// Feed record reference
    pub external_id: Option<String>,
    pub publication_date: Option<String>,
    pub keywords: Json<Vec<String>>,
    pub price: Option<String>,
    pub genre: Option<String>,
    pub cover_image_url: Option<String>,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Contributor {
    pub id: i64,
    pub name: String,
    pub biography: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BookContributor {
    pub id: i64,
    pub book_id: i64,
    pub contributor_id: i64,
    pub role: String,
    pub sequence_number: i64,
}

// ============================================================================
// Identity
// ============================================================================

/// The identifier used to match a candidate against existing books.
///
/// Only the highest-precedence identifier present is used, even when a
/// lower one would match a different row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookIdentity {
    Isbn13(String),
    Isbn10(String),
    RecordReference(String),
}

impl BookIdentity {
    pub fn of(candidate: &CandidateBook) -> Option<Self> {
        if let Some(isbn) = candidate.isbn13.as_deref().filter(|s| !s.is_empty()) {
            return Some(BookIdentity::Isbn13(isbn.to_string()));
        }
        if let Some(isbn) = candidate.isbn10.as_deref().filter(|s| !s.is_empty()) {
            return Some(BookIdentity::Isbn10(isbn.to_string()));
        }
        candidate
            .record_reference
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|reference| BookIdentity::RecordReference(reference.to_string()))
    }

    /// Column on `books` that stores this kind of identifier
    pub fn column(&self) -> &'static str {
        match self {
            BookIdentity::Isbn13(_) | BookIdentity::Isbn10(_) => "isbn",
            BookIdentity::RecordReference(_) => "external_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            BookIdentity::Isbn13(value)
            | BookIdentity::Isbn10(value)
            | BookIdentity::RecordReference(value) => value,
        }
    }
}

impl std::fmt::Display for BookIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookIdentity::Isbn13(value) => write!(f, "ISBN-13 {}", value),
            BookIdentity::Isbn10(value) => write!(f, "ISBN-10 {}", value),
            BookIdentity::RecordReference(value) => write!(f, "record {}", value),
        }
    }
}
