//! arkmig-dm (Data Manipulation) - batch migration runner
//!
//! Loads configuration and table metadata, builds the manipulator chain and
//! runs every selected table from its source table into its target table.

use anyhow::{bail, Context, Result};
use arkmig_common::config::MigrationConfig;
use arkmig_common::metadata::MetadataDocument;
use arkmig_common::{MetadataProvider, NameSide, Table};
use arkmig_dm::db::{open_database, SqliteRepository};
use arkmig_dm::{
    build_chain, BatchSink, DataRepository, KeyCache, KeyCacheConfig, MigrationLogger,
    ReconcileContext, TableRunner, TracingLogger,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "arkmig-dm", version, about = "Migrate and reconcile archive tables")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ARKMIG_CONFIG")]
    config: Option<PathBuf>,

    /// Database path, overriding the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    /// Metadata document path, overriding the configuration
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Only process these tables (source or target names); repeatable
    #[arg(long = "table")]
    tables: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = MigrationConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting arkmig-dm v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(path) = args.database {
        config.database.path = path;
    }
    if let Some(path) = args.metadata {
        config.metadata.path = path;
    }
    info!("Database path: {}", config.database.path.display());
    info!("Metadata path: {}", config.metadata.path.display());

    let source = MetadataDocument::load(&config.metadata.path)
        .and_then(|doc| doc.build())
        .context("Failed to load table metadata")?;
    let metadata: Arc<dyn MetadataProvider> = Arc::new(source);

    let pool = open_database(&config.database.path)
        .await
        .context("Failed to open database")?;
    let repository = Arc::new(SqliteRepository::new(pool, config.processing.batch_size));

    let tables = select_tables(metadata.as_ref(), &args.tables)?;
    for table in &tables {
        repository
            .ensure_table(table, NameSide::Target)
            .await
            .with_context(|| format!("Failed to create target table {}", table.target_name()))?;
    }

    let cache = Arc::new(KeyCache::new(KeyCacheConfig::from(&config.cache)));
    let ctx = ReconcileContext::new(
        Arc::clone(&metadata),
        Arc::clone(&repository) as Arc<dyn DataRepository>,
        Arc::clone(&cache),
        Arc::new(TracingLogger) as Arc<dyn MigrationLogger>,
    );
    let chain = build_chain(&config.manipulators, &ctx).context("Invalid manipulator configuration")?;
    info!("✓ {} manipulators registered", chain.len());

    let runner = TableRunner::new(
        Arc::clone(&repository) as Arc<dyn DataRepository>,
        repository as Arc<dyn BatchSink>,
        Arc::new(chain),
    );
    let results = runner
        .run_tables(tables, config.processing.max_concurrent_tables)
        .await;
    cache.shutdown().await;

    let mut failed = 0;
    for (table, result) in &results {
        match result {
            Ok(summary) => info!("✓ {}: {} rows written", table, summary.rows_written),
            Err(e) => {
                error!("✗ {}: {}", table, e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} tables failed", failed, results.len());
    }

    info!("Migration complete: {} tables", results.len());
    Ok(())
}

/// Tables named on the command line, or every table when none are named
fn select_tables(metadata: &dyn MetadataProvider, names: &[String]) -> Result<Vec<Arc<Table>>> {
    let source = metadata.data_source();
    if names.is_empty() {
        return Ok(source.tables().to_vec());
    }
    names
        .iter()
        .map(|name| source.require_table(name).map_err(anyhow::Error::from))
        .collect()
}
