//! Bookfeed Ingest - ONIX feed import tool

use anyhow::{Context, Result};
use bookfeed_common::logging::{init_logging, LogConfig, LogLevel};
use bookfeed_ingest::config::{ImportsConfig, IngestConfig};
use bookfeed_ingest::import_log::ImportLogStore;
use bookfeed_ingest::lifecycle::ImportDirectories;
use bookfeed_ingest::{db, FileLifecycleManager, ImportOrchestrator};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bookfeed-ingest")]
#[command(author, version, about = "ONIX book feed import tool")]
struct Cli {
    /// What to run (defaults to processing the incoming directory)
    #[command(subcommand)]
    command: Option<Command>,

    /// SQLite database URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Root directory holding incoming/, processed/ and failed/
    #[arg(long, global = true)]
    imports_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import every eligible feed in the incoming directory
    Process,

    /// Import a single feed file
    Import {
        /// Feed file to import
        file: PathBuf,
    },

    /// List recent import logs
    Logs {
        /// Maximum number of logs to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Show one import log with its errors
    ShowLog {
        /// Import log id
        id: i64,
    },

    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("bookfeed-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    init_logging(&log_config)?;

    let config = load_config(&cli)?;
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to open catalog database")?;
    db::run_migrations(&pool).await?;

    match cli.command.unwrap_or(Command::Process) {
        Command::Migrate => {
            info!("Migrations applied");
        },
        Command::Logs { limit } => {
            let logs = ImportLogStore::new(pool).list(limit).await?;
            print_json(&logs)?;
        },
        Command::ShowLog { id } => {
            let detail = ImportLogStore::new(pool).detail(id).await?;
            print_json(&detail)?;
        },
        Command::Import { file } => {
            let orchestrator = orchestrator(pool, &config).await?;
            let summary = orchestrator.import_file(&file).await?;
            print_json(&summary)?;
        },
        Command::Process => {
            let manager = FileLifecycleManager::new(
                orchestrator(pool, &config).await?,
                config.imports.allowed_extensions.clone(),
            );
            let summaries = manager.process_incoming().await?;
            info!(files = summaries.len(), "Incoming directory processed");
            print_json(&summaries)?;
        },
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<IngestConfig> {
    let mut config = IngestConfig::from_env()?;

    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(root) = &cli.imports_dir {
        let allowed_extensions = std::mem::take(&mut config.imports.allowed_extensions);
        config.imports = ImportsConfig {
            allowed_extensions,
            ..ImportsConfig::under(root)
        };
    }

    config.validate()?;
    Ok(config)
}

async fn orchestrator(pool: sqlx::SqlitePool, config: &IngestConfig) -> Result<ImportOrchestrator> {
    let directories = ImportDirectories::from_config(&config.imports);
    directories
        .ensure_exists()
        .await
        .context("Failed to create import directories")?;

    Ok(ImportOrchestrator::new(pool, directories, &config.pipeline))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
