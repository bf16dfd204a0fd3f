//! Entity resolution and book upsert tests against a real SQLite catalog

mod common;

use anyhow::Result;
use bookfeed_ingest::catalog::{
    Book, BookContributor, BookUpserter, EntityResolver, RecordOutcome, SkipReason, UpsertAction,
    UNTITLED,
};
use bookfeed_ingest::import_log::{ErrorSink, ImportLogStore};
use bookfeed_ingest::onix::{CandidateBook, CandidateContributor};
use common::TestCatalog;

fn contributor(name: &str, role: &str, sequence_number: i64) -> CandidateContributor {
    CandidateContributor {
        name: name.to_string(),
        role: role.to_string(),
        sequence_number,
        biography: None,
    }
}

fn candidate(isbn13: &str, title: &str, contributors: Vec<CandidateContributor>) -> CandidateBook {
    CandidateBook {
        record_reference: Some(format!("ref-{}", isbn13)),
        isbn13: Some(isbn13.to_string()),
        title: Some(title.to_string()),
        contributors,
        ..Default::default()
    }
}

async fn open_log(catalog: &TestCatalog) -> Result<i64> {
    let log = ImportLogStore::new(catalog.pool.clone())
        .create("feed.xml", "/tmp/feed.xml", "onix")
        .await?;
    Ok(log.id)
}

async fn fetch_book(catalog: &TestCatalog, id: i64) -> Result<Book> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
        .bind(id)
        .fetch_one(&catalog.pool)
        .await?;
    Ok(book)
}

async fn fetch_links(catalog: &TestCatalog, book_id: i64) -> Result<Vec<BookContributor>> {
    let links = sqlx::query_as::<_, BookContributor>(
        "SELECT * FROM book_contributors WHERE book_id = ? ORDER BY sequence_number",
    )
    .bind(book_id)
    .fetch_all(&catalog.pool)
    .await?;
    Ok(links)
}

// ============================================================================
// Entity Resolver
// ============================================================================

#[tokio::test]
async fn test_resolver_maps_every_distinct_name() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 2);

    let mut first = candidate(
        "9780000000001",
        "One",
        vec![contributor("Jane Doe", "A01", 1), contributor("John Smith", "A12", 2)],
    );
    first.publisher = Some("Test Press".to_string());
    let mut second = candidate(
        "9780000000002",
        "Two",
        vec![contributor("Jane Doe", "A01", 1), contributor("Ann Lee", "B01", 2)],
    );
    second.publisher = Some(" Test Press ".to_string());

    let resolved = resolver.resolve(&[first, second]).await?;

    let mut names: Vec<&str> = resolved.contributors().keys().map(String::as_str).collect();
    names.sort();
    assert_eq!(names, vec!["Ann Lee", "Jane Doe", "John Smith"]);
    assert_eq!(resolved.publishers().len(), 1);
    assert!(resolved.publisher_id(" Test Press ").is_some());
    assert_eq!(resolved.created_contributors(), 3);
    assert_eq!(resolved.created_publishers(), 1);

    assert_eq!(catalog.count("contributors").await?, 3);
    assert_eq!(catalog.count("publishers").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_resolver_reuses_existing_names() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 500);

    let books = vec![candidate("9780000000001", "One", vec![contributor("Jane Doe", "A01", 1)])];
    let first = resolver.resolve(&books).await?;
    let second = resolver.resolve(&books).await?;

    assert_eq!(first.contributor_id("Jane Doe"), second.contributor_id("Jane Doe"));
    assert_eq!(second.created_contributors(), 0);
    assert_eq!(catalog.count("contributors").await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_resolver_keeps_case_variants_apart() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 500);

    let books = vec![candidate(
        "9780000000001",
        "One",
        vec![contributor("Jane Doe", "A01", 1), contributor("JANE DOE", "A01", 2)],
    )];
    let resolved = resolver.resolve(&books).await?;

    assert_ne!(resolved.contributor_id("Jane Doe"), resolved.contributor_id("JANE DOE"));
    assert_eq!(catalog.count("contributors").await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_resolver_keeps_first_biography() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 500);

    let plain = contributor("Jane Doe", "A01", 1);
    let mut with_bio = contributor("Jane Doe", "A01", 1);
    with_bio.biography = Some("Jane writes books.".to_string());

    let books = vec![
        candidate("9780000000001", "One", vec![plain]),
        candidate("9780000000002", "Two", vec![with_bio]),
    ];
    resolver.resolve(&books).await?;

    let biography: Option<String> =
        sqlx::query_scalar("SELECT biography FROM contributors WHERE name = 'Jane Doe'")
            .fetch_one(&catalog.pool)
            .await?;
    assert_eq!(biography.as_deref(), Some("Jane writes books."));
    Ok(())
}

// ============================================================================
// Book Upserter
// ============================================================================

#[tokio::test]
async fn test_upsert_creates_book_with_links() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let import_log_id = open_log(&catalog).await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 500);
    let upserter = BookUpserter::new(catalog.pool.clone(), ErrorSink::new(catalog.pool.clone()));

    let mut book = candidate(
        "9780000000001",
        "Test Book",
        vec![contributor("Jane Doe", "A01", 1), contributor("John Smith", "A12", 2)],
    );
    book.publisher = Some("Test Press".to_string());
    book.keywords = vec!["mystery".to_string(), "detectives".to_string()];
    book.price = Some("24.99".to_string());

    let entities = resolver.resolve(std::slice::from_ref(&book)).await?;
    let outcome = upserter.upsert(&book, &entities, import_log_id).await;

    let RecordOutcome::Imported { book_id, action } = outcome else {
        panic!("expected an import, got {:?}", outcome);
    };
    assert_eq!(action, UpsertAction::Created);

    let stored = fetch_book(&catalog, book_id).await?;
    assert_eq!(stored.title, "Test Book");
    assert_eq!(stored.isbn.as_deref(), Some("9780000000001"));
    assert_eq!(stored.external_id.as_deref(), Some("ref-9780000000001"));
    assert_eq!(stored.publisher_id, entities.publisher_id("Test Press"));
    assert_eq!(stored.keywords.0, vec!["mystery", "detectives"]);
    assert_eq!(stored.price.as_deref(), Some("24.99"));
    assert_eq!(stored.status, "active");
    assert_eq!(stored.created_by, "import");

    let jane = entities.contributor_id("Jane Doe").unwrap();
    let john = entities.contributor_id("John Smith").unwrap();
    assert_eq!(stored.contributor_ids.0, vec![jane, john]);

    let links = fetch_links(&catalog, book_id).await?;
    assert_eq!(links.len(), 2);
    assert_eq!((links[0].contributor_id, links[0].role.as_str(), links[0].sequence_number), (jane, "author", 1));
    assert_eq!((links[1].contributor_id, links[1].role.as_str(), links[1].sequence_number), (john, "illustrator", 2));
    Ok(())
}

#[tokio::test]
async fn test_reimport_updates_in_place() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let import_log_id = open_log(&catalog).await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 500);
    let upserter = BookUpserter::new(catalog.pool.clone(), ErrorSink::new(catalog.pool.clone()));

    let original = candidate("9780000000001", "First Title", vec![contributor("Jane Doe", "A01", 1)]);
    let entities = resolver.resolve(std::slice::from_ref(&original)).await?;
    let RecordOutcome::Imported { book_id, .. } = upserter.upsert(&original, &entities, import_log_id).await else {
        panic!("first import failed");
    };
    let created_at = fetch_book(&catalog, book_id).await?.created_at;

    // Same feed again: still one book, still one link
    let again = upserter.upsert(&original, &entities, import_log_id).await;
    assert_eq!(
        again,
        RecordOutcome::Imported {
            book_id,
            action: UpsertAction::Updated
        }
    );
    assert_eq!(catalog.count("books").await?, 1);
    assert_eq!(catalog.count("book_contributors").await?, 1);

    // Changed title and contributors replace the old ones
    let revised = candidate("9780000000001", "Second Title", vec![contributor("Ann Lee", "B01", 1)]);
    let entities = resolver.resolve(std::slice::from_ref(&revised)).await?;
    upserter.upsert(&revised, &entities, import_log_id).await;

    let stored = fetch_book(&catalog, book_id).await?;
    assert_eq!(stored.title, "Second Title");
    assert_eq!(stored.created_at, created_at);

    let links = fetch_links(&catalog, book_id).await?;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].contributor_id, entities.contributor_id("Ann Lee").unwrap());
    assert_eq!(links[0].role, "editor");
    Ok(())
}

#[tokio::test]
async fn test_record_reference_identifies_book_without_isbn() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let import_log_id = open_log(&catalog).await?;
    let upserter = BookUpserter::new(catalog.pool.clone(), ErrorSink::new(catalog.pool.clone()));
    let entities = EntityResolver::new(catalog.pool.clone(), 500).resolve(&[]).await?;

    let book = CandidateBook {
        record_reference: Some("REF-42".to_string()),
        ..Default::default()
    };

    let first = upserter.upsert(&book, &entities, import_log_id).await;
    let second = upserter.upsert(&book, &entities, import_log_id).await;

    let RecordOutcome::Imported { book_id, action: UpsertAction::Created } = first else {
        panic!("expected a created book, got {:?}", first);
    };
    assert_eq!(
        second,
        RecordOutcome::Imported {
            book_id,
            action: UpsertAction::Updated
        }
    );

    let stored = fetch_book(&catalog, book_id).await?;
    assert_eq!(stored.title, UNTITLED);
    assert_eq!(stored.isbn, None);
    assert_eq!(stored.external_id.as_deref(), Some("REF-42"));
    Ok(())
}

#[tokio::test]
async fn test_skipped_records_write_nothing() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let import_log_id = open_log(&catalog).await?;
    let upserter = BookUpserter::new(catalog.pool.clone(), ErrorSink::new(catalog.pool.clone()));
    let entities = EntityResolver::new(catalog.pool.clone(), 500).resolve(&[]).await?;

    let mut deletion = candidate("9780000000001", "Gone", vec![]);
    deletion.notification_type = Some("05".to_string());
    let anonymous = CandidateBook {
        title: Some("No identifiers".to_string()),
        ..Default::default()
    };

    assert_eq!(
        upserter.upsert(&deletion, &entities, import_log_id).await,
        RecordOutcome::Skipped {
            reason: SkipReason::DeletionNotice
        }
    );
    assert_eq!(
        upserter.upsert(&anonymous, &entities, import_log_id).await,
        RecordOutcome::Skipped {
            reason: SkipReason::NoIdentifier
        }
    );
    assert_eq!(catalog.count("books").await?, 0);
    assert_eq!(catalog.count("import_errors").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_record_is_reported() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    catalog.poison_books().await?;
    let import_log_id = open_log(&catalog).await?;
    let upserter = BookUpserter::new(catalog.pool.clone(), ErrorSink::new(catalog.pool.clone()));
    let entities = EntityResolver::new(catalog.pool.clone(), 500).resolve(&[]).await?;

    let book = candidate("9780000000009", "Poison", vec![]);
    let outcome = upserter.upsert(&book, &entities, import_log_id).await;

    let RecordOutcome::Failed { identifier, message } = outcome.clone() else {
        panic!("expected a failure, got {:?}", outcome);
    };
    assert_eq!(identifier.as_deref(), Some("9780000000009"));
    assert!(message.contains("poisoned record"));

    let errors = ImportLogStore::new(catalog.pool.clone())
        .errors_for(import_log_id)
        .await?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type.as_str(), "database_error");
    assert_eq!(errors[0].book_identifier.as_deref(), Some("9780000000009"));
    let details = errors[0].error_details.as_ref().unwrap();
    assert_eq!(details["title"], "Poison");
    assert_eq!(details["isbn"], "9780000000009");

    assert_eq!(catalog.count("books").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_link_failure_rolls_back_new_book() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    catalog.break_links().await?;
    let import_log_id = open_log(&catalog).await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 500);
    let upserter = BookUpserter::new(catalog.pool.clone(), ErrorSink::new(catalog.pool.clone()));

    let book = candidate("9780000000001", "Test Book", vec![contributor("Jane Doe", "A01", 1)]);
    let entities = resolver.resolve(std::slice::from_ref(&book)).await?;
    let outcome = upserter.upsert(&book, &entities, import_log_id).await;

    assert!(matches!(outcome, RecordOutcome::Failed { .. }));
    assert_eq!(catalog.count("books").await?, 0);
    assert_eq!(catalog.count("book_contributors").await?, 0);

    let errors = ImportLogStore::new(catalog.pool.clone())
        .errors_for(import_log_id)
        .await?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type.as_str(), "database_error");
    assert!(errors[0].error_message.contains("links unavailable"));
    Ok(())
}

#[tokio::test]
async fn test_link_failure_keeps_previous_version() -> Result<()> {
    let catalog = TestCatalog::start().await?;
    let import_log_id = open_log(&catalog).await?;
    let resolver = EntityResolver::new(catalog.pool.clone(), 500);
    let upserter = BookUpserter::new(catalog.pool.clone(), ErrorSink::new(catalog.pool.clone()));

    let original = candidate("9780000000001", "First Title", vec![contributor("Jane Doe", "A01", 1)]);
    let entities = resolver.resolve(std::slice::from_ref(&original)).await?;
    let RecordOutcome::Imported { book_id, .. } = upserter.upsert(&original, &entities, import_log_id).await else {
        panic!("first import failed");
    };
    let jane = entities.contributor_id("Jane Doe").unwrap();

    catalog.break_links().await?;
    let revised = candidate("9780000000001", "Second Title", vec![contributor("Ann Lee", "B01", 1)]);
    let entities = resolver.resolve(std::slice::from_ref(&revised)).await?;
    let outcome = upserter.upsert(&revised, &entities, import_log_id).await;
    assert!(matches!(outcome, RecordOutcome::Failed { .. }));

    let stored = fetch_book(&catalog, book_id).await?;
    assert_eq!(stored.title, "First Title");
    assert_eq!(stored.contributor_ids.0, vec![jane]);

    let links = fetch_links(&catalog, book_id).await?;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].contributor_id, jane);
    assert_eq!(links[0].role, "author");
    Ok(())
}
