//! oxide-sync CLI
//!
//! Command-line tool for synchronizing a SQLite schema with entity metadata.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_sync::metadata;
use oxide_sync::prelude::*;
use oxide_sync_sqlite::SqliteDriver;

/// Converge a database schema onto declarative entity metadata.
#[derive(Parser)]
#[command(name = "oxide-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Entity metadata file (JSON).
    #[arg(short, long, default_value = "entities.json")]
    metadata: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the database schema in line with the metadata.
    Sync {
        /// Run every change, print the SQL, then roll back.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the live schema of the metadata's tables as JSON.
    Inspect,

    /// Validate the metadata file without touching the database.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let entities = load_entities(&cli.metadata)?;

    match cli.command {
        Commands::Check => {
            metadata::validate_all(entities.iter().filter(|e| !e.skip_sync))?;
            info!(
                tables = entities.iter().filter(|e| !e.skip_sync).count(),
                "Metadata is valid"
            );
        }

        Commands::Inspect => {
            let driver = SqliteDriver::new(connect(&cli.database).await?);
            let names: Vec<String> = entities
                .iter()
                .filter(|e| !e.skip_sync)
                .map(|e| e.table_name.clone())
                .collect();
            let tables = driver.load_table_snapshots(&names).await?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }

        Commands::Sync { dry_run } => {
            let driver = SqliteDriver::new(connect(&cli.database).await?);

            if dry_run {
                info!("Dry run mode - changes will be rolled back.");
            }

            SchemaBuilder::new(&driver, &entities)
                .with_options(SyncOptions::new().dry_run(dry_run))
                .build()
                .await?;

            let statements = driver.executed_statements().await;
            if dry_run {
                for sql in &statements {
                    println!("{};", sql);
                }
            } else if statements.is_empty() {
                info!("Schema is up to date.");
            } else {
                info!(statements = statements.len(), "Schema synchronized.");
            }
        }
    }

    Ok(())
}

fn load_entities(path: &Path) -> anyhow::Result<Vec<EntityMetadata>> {
    metadata::load_from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to load metadata from {}: {}", path.display(), e))
}

async fn connect(database: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections(database))
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Every connection to an in-memory database opens its own database, so
/// those get a single connection.
fn max_connections(database: &str) -> u32 {
    if database.contains(":memory:") || database.contains("mode=memory") {
        1
    } else {
        5
    }
}
