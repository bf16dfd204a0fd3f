//! Shared fixtures for the bookfeed-ingest integration tests
//!
//! Every test gets its own temporary directory holding a fresh SQLite catalog
//! (migrations applied) and an incoming/processed/failed layout.

#![allow(dead_code)]

use anyhow::Result;
use bookfeed_ingest::config::{DatabaseConfig, PipelineConfig};
use bookfeed_ingest::db;
use bookfeed_ingest::lifecycle::ImportDirectories;
use bookfeed_ingest::ImportOrchestrator;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tempfile::TempDir;

// ============================================================================
// Test Catalog
// ============================================================================

pub struct TestCatalog {
    pub pool: SqlitePool,
    pub directories: ImportDirectories,
    // Removed on drop
    _root: TempDir,
}

impl TestCatalog {
    pub async fn start() -> Result<Self> {
        let root = tempfile::tempdir()?;

        let config = DatabaseConfig {
            url: format!("sqlite://{}", root.path().join("catalog.db").display()),
            max_connections: 2,
            connect_timeout_secs: 5,
        };
        let pool = db::create_pool(&config).await?;
        db::run_migrations(&pool).await?;

        let imports = root.path().join("imports");
        let directories = ImportDirectories::new(
            imports.join("incoming"),
            imports.join("processed"),
            imports.join("failed"),
        );
        directories.ensure_exists().await?;

        Ok(Self {
            pool,
            directories,
            _root: root,
        })
    }

    pub fn orchestrator(&self) -> ImportOrchestrator {
        let pipeline = PipelineConfig {
            progress_interval: 2,
            lookup_chunk_size: 2,
        };
        ImportOrchestrator::new(self.pool.clone(), self.directories.clone(), &pipeline)
    }

    /// Drop a feed into the incoming directory
    pub async fn write_incoming(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.directories.incoming.join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Make every insert of a book titled "Poison" fail
    pub async fn poison_books(&self) -> Result<()> {
        sqlx::query(
            "CREATE TRIGGER poison_books BEFORE INSERT ON books \
             WHEN NEW.title = 'Poison' \
             BEGIN SELECT RAISE(ABORT, 'poisoned record'); END;",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Make every contributor link insert fail
    pub async fn break_links(&self) -> Result<()> {
        sqlx::query(
            "CREATE TRIGGER break_links BEFORE INSERT ON book_contributors \
             BEGIN SELECT RAISE(ABORT, 'links unavailable'); END;",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Make every contributor insert fail
    pub async fn break_contributors(&self) -> Result<()> {
        sqlx::query(
            "CREATE TRIGGER break_contributors BEFORE INSERT ON contributors \
             BEGIN SELECT RAISE(ABORT, 'contributors unavailable'); END;",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Feed Builders
// ============================================================================

/// A minimal ONIX 3.0 product
#[derive(Debug, Clone, Default)]
pub struct ProductXml {
    pub record_reference: String,
    pub notification_type: Option<String>,
    pub isbn13: Option<String>,
    pub title: Option<String>,
    /// (role code, name)
    pub contributors: Vec<(String, String)>,
    pub publisher: Option<String>,
}

impl ProductXml {
    pub fn book(record_reference: &str, isbn13: &str, title: &str) -> Self {
        Self {
            record_reference: record_reference.to_string(),
            isbn13: Some(isbn13.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn contributor(mut self, role: &str, name: &str) -> Self {
        self.contributors.push((role.to_string(), name.to_string()));
        self
    }

    pub fn publisher(mut self, name: &str) -> Self {
        self.publisher = Some(name.to_string());
        self
    }

    pub fn deletion(mut self) -> Self {
        self.notification_type = Some("05".to_string());
        self
    }

    pub fn render(&self) -> String {
        let mut xml = String::from("  <Product>\n");
        xml.push_str(&format!(
            "    <RecordReference>{}</RecordReference>\n",
            self.record_reference
        ));
        xml.push_str(&format!(
            "    <NotificationType>{}</NotificationType>\n",
            self.notification_type.as_deref().unwrap_or("03")
        ));
        if let Some(isbn) = &self.isbn13 {
            xml.push_str(&format!(
                "    <ProductIdentifier><ProductIDType>15</ProductIDType><IDValue>{}</IDValue></ProductIdentifier>\n",
                isbn
            ));
        }

        xml.push_str("    <DescriptiveDetail>\n");
        if let Some(title) = &self.title {
            xml.push_str(&format!(
                "      <TitleDetail><TitleType>01</TitleType><TitleElement><TitleElementLevel>01</TitleElementLevel><TitleText>{}</TitleText></TitleElement></TitleDetail>\n",
                title
            ));
        }
        for (index, (role, name)) in self.contributors.iter().enumerate() {
            xml.push_str(&format!(
                "      <Contributor><SequenceNumber>{}</SequenceNumber><ContributorRole>{}</ContributorRole><PersonName>{}</PersonName></Contributor>\n",
                index + 1,
                role,
                name
            ));
        }
        xml.push_str("    </DescriptiveDetail>\n");

        if let Some(publisher) = &self.publisher {
            xml.push_str(&format!(
                "    <PublishingDetail><Publisher><PublishingRole>01</PublishingRole><PublisherName>{}</PublisherName></Publisher></PublishingDetail>\n",
                publisher
            ));
        }

        xml.push_str("  </Product>\n");
        xml
    }
}

/// Wrap products in an ONIX 3.0 message
pub fn onix_feed(products: &[ProductXml]) -> String {
    let body: String = products.iter().map(ProductXml::render).collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <ONIXMessage release=\"3.0\" xmlns=\"http://ns.editeur.org/onix/3.0/reference\">\n\
         <Header><Sender><SenderName>Test Press</SenderName></Sender></Header>\n\
         {}</ONIXMessage>\n",
        body
    )
}
