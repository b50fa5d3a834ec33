//! Document repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Document;

/// Repository interface for Document persistence.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document.
    async fn create(&self, document: &Document) -> DomainResult<()>;

    /// Get a document by ID regardless of owner.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Document>>;

    /// Find an owner's document with the given content hash.
    async fn find_by_hash(&self, owner_id: &str, content_hash: &str) -> DomainResult<Option<Document>>;

    /// List an owner's documents, newest first.
    async fn list_for_owner(&self, owner_id: &str) -> DomainResult<Vec<Document>>;

    /// Count an owner's documents.
    async fn count_for_owner(&self, owner_id: &str) -> DomainResult<u64>;

    /// Delete an owner's document; analyses cascade. Returns false when the
    /// document does not exist or belongs to someone else.
    async fn delete(&self, id: Uuid, owner_id: &str) -> DomainResult<bool>;

    /// Mark the document `analyzing` and claim a new run generation.
    async fn begin_run(&self, id: Uuid) -> DomainResult<i64>;

    /// Mark the document `error` if `generation` is still the latest run.
    /// Returns whether the status was written.
    async fn mark_error(&self, id: Uuid, generation: i64) -> DomainResult<bool>;
}
