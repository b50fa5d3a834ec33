//! Embedding store port and its no-op implementation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Fire-and-forget store for semantic embeddings of report summaries.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn store(&self, analysis_id: Uuid, document_id: Uuid, text: &str) -> DomainResult<()>;
}

/// An embedding store that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NullEmbeddingStore;

#[async_trait]
impl EmbeddingStore for NullEmbeddingStore {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn store(&self, _analysis_id: Uuid, _document_id: Uuid, _text: &str) -> DomainResult<()> {
        Ok(())
    }
}
