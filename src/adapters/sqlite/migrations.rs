//! SQLite database migration management.
//!
//! The extended analysis columns ship as their own migration so a database
//! that lags behind the application (core schema only) can be reproduced by
//! applying a prefix of the list.

use sqlx::SqlitePool;
use thiserror::Error;

/// Errors raised while applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError { version: i64, #[source] source: sqlx::Error },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

/// One versioned SQL script.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub sql: String,
}

/// Applies embedded migrations and tracks the schema version.
pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    /// Create a migrator for `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply every migration newer than the current version. Returns how many ran.
    pub async fn run_embedded_migrations(&self, migrations: Vec<Migration>) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current_version = self.get_current_version().await?;
        let pending: Vec<_> = migrations.into_iter().filter(|m| m.version > current_version).collect();

        for migration in &pending {
            tracing::info!(version = migration.version, description = %migration.description, "applying migration");
            self.apply_migration(migration).await?;
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )"
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError { version: 0, source: e })?;
        Ok(())
    }

    /// Highest applied migration version, 0 for a fresh database.
    pub async fn get_current_version(&self) -> Result<i64, MigrationError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_optional(&self.pool)
            .await
            .map_err(MigrationError::VersionCheckError)?;
        Ok(result.map_or(0, |(v,)| v))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        let to_err = |e| MigrationError::ExecutionError { version: migration.version, source: e };

        let mut tx = self.pool.begin().await.map_err(to_err)?;
        sqlx::raw_sql(&migration.sql).execute(&mut *tx).await.map_err(to_err)?;
        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(to_err)?;
        tx.commit().await.map_err(to_err)?;
        Ok(())
    }
}

/// Documents, analyses with their core fields, and bias instances.
pub fn core_schema_migration() -> Migration {
    Migration {
        version: 1,
        description: "Core schema".to_string(),
        sql: include_str!("../../../migrations/001_core_schema.sql").to_string(),
    }
}

/// The nullable JSON columns holding the extended report sections.
pub fn extended_analysis_fields_migration() -> Migration {
    Migration {
        version: 2,
        description: "Extended analysis fields".to_string(),
        sql: include_str!("../../../migrations/002_extended_analysis_fields.sql").to_string(),
    }
}

/// Side table for summary embeddings.
pub fn analysis_embeddings_migration() -> Migration {
    Migration {
        version: 3,
        description: "Analysis embeddings".to_string(),
        sql: include_str!("../../../migrations/003_analysis_embeddings.sql").to_string(),
    }
}

/// Every migration, in version order.
pub fn all_embedded_migrations() -> Vec<Migration> {
    vec![
        core_schema_migration(),
        extended_analysis_fields_migration(),
        analysis_embeddings_migration(),
    ]
}

/// Migrations a lagging deployment has applied: everything except the
/// extended analysis columns.
pub fn core_only_migrations() -> Vec<Migration> {
    vec![core_schema_migration(), analysis_embeddings_migration()]
}
