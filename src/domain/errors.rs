//! Domain errors for the document-audit system.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the audit system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Store(StoreError::from(err))
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Errors raised by the document store.
///
/// The store reports a recognizable class for "column or relation does not
/// exist", which callers use to fall back to the core field set when the
/// deployed schema lags behind the application.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Schema drift: {0}")]
    SchemaDrift(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    /// Whether the failure belongs to the missing column/relation class.
    pub fn is_schema_drift(&self) -> bool {
        matches!(self, Self::SchemaDrift(_))
    }
}

/// Message fragments SQLite uses for undefined columns and relations.
const DRIFT_MARKERS: [&str; 3] = ["no such column", "has no column named", "no such table"];

/// Returns true if a raw database message belongs to the missing
/// column/relation class.
pub fn is_missing_schema_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    DRIFT_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        match &err {
            sqlx::Error::Database(db) if is_missing_schema_message(db.message()) => {
                StoreError::SchemaDrift(message)
            }
            sqlx::Error::ColumnNotFound(_) => StoreError::SchemaDrift(message),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::CorruptRow(message)
            }
            _ => StoreError::Query(message),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::CorruptRow(err.to_string())
    }
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
