//! SQLite implementation of the DocumentRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Document, DocumentStatus};
use crate::domain::ports::DocumentRepository;

const DOCUMENT_COLUMNS: &str =
    "id, owner_id, filename, content, content_hash, status, run_generation, created_at, updated_at";

/// SQLite implementation of [`DocumentRepository`].
#[derive(Clone)]
pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    /// Create a repository over an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn create(&self, document: &Document) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO documents (id, owner_id, filename, content, content_hash, status, run_generation, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(document.id.to_string())
        .bind(&document.owner_id)
        .bind(&document.filename)
        .bind(&document.content)
        .bind(&document.content_hash)
        .bind(document.status.as_str())
        .bind(document.run_generation)
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn find_by_hash(&self, owner_id: &str, content_hash: &str) -> DomainResult<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ? AND content_hash = ?"
        ))
        .bind(owner_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn count_for_owner(&self, owner_id: &str) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> DomainResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn begin_run(&self, id: Uuid) -> DomainResult<i64> {
        let generation: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE documents
               SET status = ?, run_generation = run_generation + 1, updated_at = ?
               WHERE id = ?
               RETURNING run_generation"#
        )
        .bind(DocumentStatus::Analyzing.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        generation.map(|(g,)| g).ok_or(DomainError::DocumentNotFound(id))
    }

    async fn mark_error(&self, id: Uuid, generation: i64) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ? WHERE id = ? AND run_generation = ?"
        )
        .bind(DocumentStatus::Error.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(generation)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    owner_id: String,
    filename: String,
    content: String,
    content_hash: String,
    status: String,
    run_generation: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = DomainError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let status = DocumentStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid document status: {}", row.status)))?;

        Ok(Document {
            id: parse_uuid(&row.id)?,
            owner_id: row.owner_id,
            filename: row.filename,
            content: row.content,
            content_hash: row.content_hash,
            status,
            run_generation: row.run_generation,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
