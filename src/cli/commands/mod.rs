//! CLI command implementations.

pub mod analyze;
pub mod document;
pub mod init;
pub mod insights;
pub mod serve;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::sqlite::initialize_database;
use crate::domain::models::Config;

/// Open the configured database, applying pending migrations.
pub(crate) async fn open_database(config: &Config) -> Result<SqlitePool> {
    initialize_database(&config.database)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))
}
