//! SQLite database adapters for the document-audit store.

pub mod analysis_repository;
pub mod connection;
pub mod document_repository;
pub mod embedding_store;
pub mod migrations;
pub mod schema_gate;

pub use analysis_repository::SqliteAnalysisRepository;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use document_repository::SqliteDocumentRepository;
pub use embedding_store::SqliteEmbeddingStore;
pub use migrations::{
    all_embedded_migrations, core_only_migrations, extended_analysis_fields_migration, Migration,
    MigrationError, Migrator,
};
pub use schema_gate::{GateState, SchemaGate};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::models::DatabaseConfig;

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::CorruptRow(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> StoreResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| StoreError::CorruptRow(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional JSON column; NULL means the section is absent.
pub fn parse_optional_json<T: serde::de::DeserializeOwned>(s: Option<String>) -> StoreResult<Option<T>> {
    s.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| StoreError::CorruptRow(e.to_string()))
}

/// Serialize an optional section into a nullable JSON column.
pub fn to_optional_json<T: serde::Serialize>(value: Option<&T>) -> StoreResult<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Query(e.to_string()))
}

/// Errors raised while opening and migrating the database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open the configured database and apply all migrations.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(&config.url(), Some(PoolConfig::from(config))).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool whose schema lacks the extended analysis
/// columns.
pub async fn create_core_only_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(core_only_migrations()).await?;
    Ok(pool)
}

/// Add the extended analysis columns to a core-only database, as an
/// operator catching up the schema would.
pub async fn apply_extended_columns(pool: &SqlitePool) -> Result<(), DatabaseError> {
    sqlx::raw_sql(&extended_analysis_fields_migration().sql).execute(pool).await?;
    Ok(())
}
