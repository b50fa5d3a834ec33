//! Commit a completed run and fire the embedding side effect.

use std::sync::Arc;

use crate::domain::errors::StoreResult;
use crate::domain::models::{AnalysisCommit, CommitOutcome, RecordShape};
use crate::domain::ports::{AnalysisRepository, EmbeddingStore};

/// Commits runs and fires the embedding side effect.
pub struct ResilientPersistence {
    analyses: Arc<dyn AnalysisRepository>,
    embeddings: Arc<dyn EmbeddingStore>,
}

impl ResilientPersistence {
    /// Create a persistence layer over the analysis and embedding stores.
    pub fn new(analyses: Arc<dyn AnalysisRepository>, embeddings: Arc<dyn EmbeddingStore>) -> Self {
        Self { analyses, embeddings }
    }

    /// Commit the analysis, its bias children and the document status in
    /// one transaction. Schema lag on the extended columns is absorbed by
    /// the repository; any other storage error is returned.
    ///
    /// The summary embedding is attempted afterwards and never fails the
    /// commit.
    pub async fn commit(&self, commit: &AnalysisCommit) -> StoreResult<CommitOutcome> {
        let outcome = self.analyses.commit(commit).await?;

        tracing::info!(
            document_id = %commit.document_id,
            analysis_id = %outcome.analysis_id,
            shape = outcome.shape.as_str(),
            status_applied = outcome.status_applied,
            biases = commit.report.biases.len(),
            "analysis committed"
        );
        if outcome.shape == RecordShape::Core {
            tracing::warn!(analysis_id = %outcome.analysis_id, "extended sections dropped due to schema lag");
        }

        if let Err(e) = self
            .embeddings
            .store(outcome.analysis_id, commit.document_id, &commit.report.summary)
            .await
        {
            metrics::counter!("docaudit_embedding_failures_total", "store" => self.embeddings.name()).increment(1);
            tracing::warn!(
                analysis_id = %outcome.analysis_id,
                store = self.embeddings.name(),
                error = %e,
                "failed to store summary embedding"
            );
        }

        Ok(outcome)
    }
}
