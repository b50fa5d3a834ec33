//! Summary embeddings stored next to the analyses they describe.
//!
//! Vectors are a hashed bag of words: every lowercase alphanumeric token is
//! hashed into one of `dimension` buckets and the counts are L2-normalized.
//! Deterministic and dependency-free, good enough to rank past decisions by
//! lexical overlap.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::EmbeddingStore;

/// Length of the stored summary vectors.
pub const DEFAULT_DIMENSION: usize = 64;

/// Embed `text` into a normalized vector of `dimension` buckets.
pub fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension.max(1)];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
    {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(head) % vector.len() as u64) as usize;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Stores hashed summary vectors in `analysis_embeddings`.
#[derive(Clone)]
pub struct SqliteEmbeddingStore {
    pool: SqlitePool,
    dimension: usize,
}

impl SqliteEmbeddingStore {
    /// Create a store over an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Stored vector for an analysis, if any.
    pub async fn get(&self, analysis_id: Uuid) -> DomainResult<Option<Vec<f32>>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT vector FROM analysis_embeddings WHERE analysis_id = ?")
            .bind(analysis_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(v,)| serde_json::from_str(&v).map_err(DomainError::from)).transpose()
    }
}

#[async_trait]
impl EmbeddingStore for SqliteEmbeddingStore {
    fn name(&self) -> &'static str {
        "sqlite-hashed"
    }

    async fn store(&self, analysis_id: Uuid, document_id: Uuid, text: &str) -> DomainResult<()> {
        let vector = hashed_embedding(text, self.dimension);
        let encoded = serde_json::to_string(&vector)?;

        sqlx::query(
            r#"INSERT OR REPLACE INTO analysis_embeddings (analysis_id, document_id, provider, dimension, vector, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#
        )
        .bind(analysis_id.to_string())
        .bind(document_id.to_string())
        .bind(self.name())
        .bind(self.dimension as i64)
        .bind(&encoded)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
