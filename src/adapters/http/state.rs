//! Shared state for the audit HTTP server.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::sqlite::{SqliteAnalysisRepository, SqliteDocumentRepository, SqliteEmbeddingStore};
use crate::domain::models::Config;
use crate::domain::ports::{AnalysisRepository, DocumentRepository, StageGraph};
use crate::services::{InsightsService, PipelineRunner, ResilientPersistence, RunnerConfig};

/// Progress events buffered between a run and its SSE response.
pub const EVENT_BUFFER: usize = 64;

/// Handles shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<dyn DocumentRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
    pub runner: Arc<PipelineRunner>,
    pub insights: Arc<InsightsService>,
    pub keep_alive: Duration,
}

impl AppState {
    /// Wire the SQLite repositories, persistence and runner around `graph`.
    pub fn from_pool(pool: SqlitePool, graph: Arc<dyn StageGraph>, config: &Config) -> Self {
        let documents: Arc<dyn DocumentRepository> = Arc::new(SqliteDocumentRepository::new(pool.clone()));
        let analyses: Arc<dyn AnalysisRepository> = Arc::new(SqliteAnalysisRepository::new(
            pool.clone(),
            Duration::from_secs(config.schema.reprobe_interval_secs),
        ));
        let persistence = Arc::new(ResilientPersistence::new(
            analyses.clone(),
            Arc::new(SqliteEmbeddingStore::new(pool)),
        ));
        let runner = Arc::new(PipelineRunner::new(
            graph,
            documents.clone(),
            persistence,
            RunnerConfig::from(&config.pipeline),
        ));
        let insights = Arc::new(InsightsService::new(
            documents.clone(),
            analyses.clone(),
            config.insights.clone(),
        ));

        Self {
            documents,
            analyses,
            runner,
            insights,
            keep_alive: Duration::from_secs(config.server.keep_alive_secs),
        }
    }
}
