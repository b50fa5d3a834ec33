//! Analysis repository port.
//!
//! Implementations must tolerate schema drift on both sides independently:
//! a write that fails because an extended column is missing is retried with
//! the core fields in the same transaction, and a read that fails the same
//! way is re-issued selecting core fields only.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::StoreResult;
use crate::domain::models::{AnalysisCommit, AnalysisRecord, CommitOutcome, Severity};

/// Storage of analyses and their bias instances.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Persist the analysis, its bias children and the document status
    /// transition in a single transaction.
    async fn commit(&self, commit: &AnalysisCommit) -> StoreResult<CommitOutcome>;

    /// Most recent analysis of a document, with its bias instances.
    async fn latest_for_document(&self, document_id: Uuid) -> StoreResult<Option<AnalysisRecord>>;

    /// Every analysis of every document the owner holds, without bias
    /// children, oldest first.
    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<AnalysisRecord>>;

    /// Bias instance counts grouped by type over the owner's documents.
    async fn bias_counts_by_type(&self, owner_id: &str) -> StoreResult<Vec<(String, u64)>>;

    /// Bias instance counts grouped by severity over the owner's documents.
    async fn bias_counts_by_severity(&self, owner_id: &str) -> StoreResult<Vec<(Severity, u64)>>;
}
