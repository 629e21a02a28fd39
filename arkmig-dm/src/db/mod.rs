//! SQLite storage for source and target tables
//!
//! Source tables are read through their source names and record filters;
//! manipulated batches are inserted into tables named after the target names.

use arkmig_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

mod codec;
mod repository;

pub use repository::SqliteRepository;

/// Open (creating if needed) the migration database
pub async fn open_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .map_err(|e| Error::Config(format!("Invalid database path {}: {}", db_path.display(), e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    info!("Opened database: {}", db_path.display());
    Ok(pool)
}
