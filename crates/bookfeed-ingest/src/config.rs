//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://bookfeed.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default root directory holding the incoming/processed/failed folders.
pub const DEFAULT_IMPORTS_DIR: &str = "./imports";

/// Default feed file extensions picked up from the incoming directory.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["xml", "onx"];

/// Default number of records between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Default number of names per bulk lookup/insert statement.
pub const DEFAULT_LOOKUP_CHUNK_SIZE: usize = 500;

/// SQLite refuses statements with more bind parameters than this.
const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub imports: ImportsConfig,
    pub pipeline: PipelineConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Import directory layout and file eligibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportsConfig {
    pub incoming_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub failed_dir: PathBuf,
    /// Lower-case extensions without the leading dot
    pub allowed_extensions: Vec<String>,
}

/// Tuning for a single import run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub progress_interval: usize,
    pub lookup_chunk_size: usize,
}

impl ImportsConfig {
    /// Standard `incoming`/`processed`/`failed` layout under `root`
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            incoming_dir: root.join("incoming"),
            processed_dir: root.join("processed"),
            failed_dir: root.join("failed"),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            lookup_chunk_size: DEFAULT_LOOKUP_CHUNK_SIZE,
        }
    }
}

impl IngestConfig {
    /// Load configuration from `.env`, environment variables and defaults
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Build a configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let imports_root = lookup("BOOKFEED_IMPORTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMPORTS_DIR));
        let mut imports = ImportsConfig::under(imports_root);

        if let Some(dir) = lookup("BOOKFEED_INCOMING_DIR") {
            imports.incoming_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("BOOKFEED_PROCESSED_DIR") {
            imports.processed_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("BOOKFEED_FAILED_DIR") {
            imports.failed_dir = PathBuf::from(dir);
        }
        if let Some(list) = lookup("BOOKFEED_ALLOWED_EXTENSIONS") {
            imports.allowed_extensions = parse_extensions(&list);
        }

        IngestConfig {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: parsed(&lookup, "DB_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            imports,
            pipeline: PipelineConfig {
                progress_interval: parsed(&lookup, "BOOKFEED_PROGRESS_INTERVAL")
                    .unwrap_or(DEFAULT_PROGRESS_INTERVAL),
                lookup_chunk_size: parsed(&lookup, "BOOKFEED_LOOKUP_CHUNK_SIZE")
                    .unwrap_or(DEFAULT_LOOKUP_CHUNK_SIZE),
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.imports.allowed_extensions.is_empty() {
            anyhow::bail!("At least one allowed feed extension is required");
        }

        if self.imports.incoming_dir == self.imports.processed_dir
            || self.imports.incoming_dir == self.imports.failed_dir
        {
            anyhow::bail!(
                "Incoming directory ({}) must differ from the processed and failed directories",
                self.imports.incoming_dir.display()
            );
        }

        if self.pipeline.progress_interval == 0 {
            anyhow::bail!("Progress interval must be greater than 0");
        }

        // Contributor inserts bind four values per row.
        if self.pipeline.lookup_chunk_size == 0
            || self.pipeline.lookup_chunk_size * 4 > SQLITE_MAX_BIND_PARAMS
        {
            anyhow::bail!(
                "Lookup chunk size must be between 1 and {}, got {}",
                SQLITE_MAX_BIND_PARAMS / 4,
                self.pipeline.lookup_chunk_size
            );
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            imports: ImportsConfig::under(DEFAULT_IMPORTS_DIR),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Numeric value of `key`; missing or unparseable values yield `None`
fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|value| value.trim().parse().ok())
}

/// Parse a comma-separated extension list ("xml, .ONX") into normalized form
pub fn parse_extensions(list: &str) -> Vec<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
