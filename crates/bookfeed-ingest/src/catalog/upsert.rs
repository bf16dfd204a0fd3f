// Book Upserts
//
// Writes one candidate record: finds the existing book by its identity,
// updates or inserts the row, and replaces its contributor links. The book
// row and its links are written in one transaction. Record failures are
// written to the error sink and returned as outcomes; they never propagate.

use crate::catalog::models::BookIdentity;
use crate::catalog::resolver::ResolvedEntities;
use crate::catalog::roles::role_label;
use crate::error::{IngestError, Result};
use crate::import_log::{ErrorSink, NewImportError};
use crate::onix::CandidateBook;
use bookfeed_common::types::ImportErrorKind;
use chrono::Utc;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

/// Title stored when a record has none
pub const UNTITLED: &str = "Untitled";

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// ONIX notification type 05
    DeletionNotice,
    /// No ISBN-13, ISBN-10 or record reference
    NoIdentifier,
}

/// What happened to one candidate record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Imported { book_id: i64, action: UpsertAction },
    Skipped { reason: SkipReason },
    Failed {
        identifier: Option<String>,
        message: String,
    },
}

// ============================================================================
// Upserter
// ============================================================================

pub struct BookUpserter {
    db: SqlitePool,
    errors: ErrorSink,
}

struct ContributorLink<'a> {
    contributor_id: i64,
    role: String,
    sequence_number: i64,
    name: &'a str,
}

impl BookUpserter {
    pub fn new(db: SqlitePool, errors: ErrorSink) -> Self {
        Self { db, errors }
    }

    /// Import one candidate against the entities resolved for its file
    pub async fn upsert(
        &self,
        candidate: &CandidateBook,
        entities: &ResolvedEntities,
        import_log_id: i64,
    ) -> RecordOutcome {
        if candidate.is_deletion() {
            debug!(
                identifier = candidate.identifier(),
                "Skipping deletion notice"
            );
            return RecordOutcome::Skipped {
                reason: SkipReason::DeletionNotice,
            };
        }

        let Some(identity) = BookIdentity::of(candidate) else {
            debug!(title = candidate.title.as_deref(), "Skipping record without identifier");
            return RecordOutcome::Skipped {
                reason: SkipReason::NoIdentifier,
            };
        };

        match self.write(candidate, &identity, entities).await {
            Ok((book_id, action)) => {
                debug!(book_id, %identity, ?action, "Book upserted");
                RecordOutcome::Imported { book_id, action }
            },
            Err(err) => self.fail(candidate, import_log_id, err).await,
        }
    }

    async fn fail(
        &self,
        candidate: &CandidateBook,
        import_log_id: i64,
        err: IngestError,
    ) -> RecordOutcome {
        let identifier = candidate.identifier().map(str::to_string);
        let message = err.to_string();

        warn!(
            import_log_id,
            identifier = identifier.as_deref(),
            error = %err,
            "Failed to import record"
        );

        let kind = if err.is_database() {
            ImportErrorKind::DatabaseError
        } else {
            ImportErrorKind::ImportError
        };

        self.errors
            .report(NewImportError {
                import_log_id,
                kind,
                message: &message,
                book_identifier: identifier.as_deref(),
                details: Some(json!({
                    "isbn": candidate.isbn13.as_deref().or(candidate.isbn10.as_deref()),
                    "title": candidate.title,
                    "recordReference": candidate.record_reference,
                })),
            })
            .await;

        RecordOutcome::Failed {
            identifier,
            message,
        }
    }

    async fn write(
        &self,
        candidate: &CandidateBook,
        identity: &BookIdentity,
        entities: &ResolvedEntities,
    ) -> Result<(i64, UpsertAction)> {
        let links = contributor_links(candidate, entities);
        let contributor_ids: Vec<i64> = links.iter().map(|link| link.contributor_id).collect();
        let publisher_id = candidate
            .publisher
            .as_deref()
            .and_then(|name| entities.publisher_id(name));

        let mut tx = self.db.begin().await?;

        let sql = format!(
            "SELECT id FROM books WHERE {} = ? ORDER BY id LIMIT 1",
            identity.column()
        );
        let existing: Option<i64> = sqlx::query_scalar(&sql)
            .bind(identity.value())
            .fetch_optional(&mut *tx)
            .await?;

        let row = BookRow {
            title: candidate
                .title
                .as_deref()
                .filter(|title| !title.trim().is_empty())
                .unwrap_or(UNTITLED),
            contributor_ids: serde_json::to_string(&contributor_ids)?,
            publisher_id,
            keywords: serde_json::to_string(&candidate.keywords)?,
            candidate,
        };

        let result = match existing {
            Some(book_id) => {
                update_book(&mut tx, book_id, &row).await?;
                (book_id, UpsertAction::Updated)
            },
            None => (insert_book(&mut tx, &row).await?, UpsertAction::Created),
        };

        replace_links(&mut tx, result.0, &links).await?;
        tx.commit().await?;

        Ok(result)
    }
}

/// Links for every candidate contributor the resolver knows, in feed order
fn contributor_links<'a>(
    candidate: &'a CandidateBook,
    entities: &ResolvedEntities,
) -> Vec<ContributorLink<'a>> {
    candidate
        .contributors
        .iter()
        .filter_map(|contributor| {
            let Some(contributor_id) = entities.contributor_id(&contributor.name) else {
                warn!(name = %contributor.name, "Contributor missing from resolved entities");
                return None;
            };
            Some(ContributorLink {
                contributor_id,
                role: role_label(&contributor.role),
                sequence_number: contributor.sequence_number,
                name: &contributor.name,
            })
        })
        .collect()
}

// ============================================================================
// Statements
// ============================================================================

struct BookRow<'a> {
    title: &'a str,
    contributor_ids: String,
    publisher_id: Option<i64>,
    keywords: String,
    candidate: &'a CandidateBook,
}

impl BookRow<'_> {
    fn isbn(&self) -> Option<&str> {
        self.candidate
            .isbn13
            .as_deref()
            .or(self.candidate.isbn10.as_deref())
    }
}

async fn insert_book(conn: &mut SqliteConnection, row: &BookRow<'_>) -> Result<i64> {
    let now = Utc::now();
    let book = row.candidate;

    let id = sqlx::query_scalar(
        "INSERT INTO books \
         (title, contributor_ids, publisher_id, description, isbn, external_id, publication_date, \
          keywords, price, genre, cover_image_url, status, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', 'import', ?, ?) \
         RETURNING id",
    )
    .bind(row.title)
    .bind(row.contributor_ids.as_str())
    .bind(row.publisher_id)
    .bind(book.description.as_deref())
    .bind(row.isbn())
    .bind(book.record_reference.as_deref())
    .bind(book.publication_date.as_deref())
    .bind(row.keywords.as_str())
    .bind(book.price.as_deref())
    .bind(book.genre.as_deref())
    .bind(book.cover_image_url.as_deref())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Replace every editable field; `created_*` columns are left alone
async fn update_book(conn: &mut SqliteConnection, book_id: i64, row: &BookRow<'_>) -> Result<()> {
    let book = row.candidate;

    sqlx::query(
        "UPDATE books SET \
         title = ?, contributor_ids = ?, publisher_id = ?, description = ?, isbn = ?, \
         external_id = ?, publication_date = ?, keywords = ?, price = ?, genre = ?, \
         cover_image_url = ?, status = 'active', updated_at = ? \
         WHERE id = ?",
    )
    .bind(row.title)
    .bind(row.contributor_ids.as_str())
    .bind(row.publisher_id)
    .bind(book.description.as_deref())
    .bind(row.isbn())
    .bind(book.record_reference.as_deref())
    .bind(book.publication_date.as_deref())
    .bind(row.keywords.as_str())
    .bind(book.price.as_deref())
    .bind(book.genre.as_deref())
    .bind(book.cover_image_url.as_deref())
    .bind(Utc::now())
    .bind(book_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn replace_links(
    conn: &mut SqliteConnection,
    book_id: i64,
    links: &[ContributorLink<'_>],
) -> Result<()> {
    sqlx::query("DELETE FROM book_contributors WHERE book_id = ?")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;

    if links.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO book_contributors (book_id, contributor_id, role, sequence_number) ",
    );
    query_builder.push_values(links, |mut b, link| {
        b.push_bind(book_id)
            .push_bind(link.contributor_id)
            .push_bind(link.role.as_str())
            .push_bind(link.sequence_number);
    });
    query_builder.build().execute(&mut *conn).await?;

    debug!(
        book_id,
        contributors = ?links.iter().map(|link| link.name).collect::<Vec<_>>(),
        "Replaced contributor links"
    );

    Ok(())
}
