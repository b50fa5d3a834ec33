//! Pipeline runner: drive the stage graph for one document, narrate
//! progress, and commit the final report.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::persistence::ResilientPersistence;
use super::progress::{ProgressSink, ProgressTracker};
use crate::domain::models::{
    AnalysisCommit, AuditReport, CommitOutcome, Document, GraphState, PipelineConfig, ProgressUpdate,
    StageEvent, StageInput, StageOutput,
};
use crate::domain::ports::{DocumentRepository, StageGraph};

/// Terminal failures of a run. Each one marks the document `error` and is
/// reported to the client as a single `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analysis failed: {0}")]
    Execution(String),

    #[error("Analysis produced no usable report: {0}")]
    Incomplete(String),

    #[error("Failed to save analysis: {0}")]
    Persistence(String),
}

impl PipelineError {
    /// Outcome label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Execution(_) => "execution_error",
            Self::Incomplete(_) => "incomplete",
            Self::Persistence(_) => "persistence_error",
        }
    }
}

/// Time limits for a run.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Ceiling for the whole run, streaming path included.
    pub overall_timeout: Duration,
    /// Ceiling for the blocking fallback; strictly shorter than the overall one.
    pub fallback_timeout: Duration,
}

impl From<&PipelineConfig> for RunnerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            overall_timeout: Duration::from_secs(config.overall_timeout_secs),
            fallback_timeout: Duration::from_secs(config.fallback_timeout_secs),
        }
    }
}

/// A successfully committed run.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub report: AuditReport,
    pub outcome: CommitOutcome,
    pub generation: i64,
}

/// Runs the stage graph for one document at a time per call.
pub struct PipelineRunner {
    graph: Arc<dyn StageGraph>,
    documents: Arc<dyn DocumentRepository>,
    persistence: Arc<ResilientPersistence>,
    config: RunnerConfig,
}

impl PipelineRunner {
    /// Create a runner over a graph, the document store and persistence.
    pub fn new(
        graph: Arc<dyn StageGraph>,
        documents: Arc<dyn DocumentRepository>,
        persistence: Arc<ResilientPersistence>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            graph,
            documents,
            persistence,
            config,
        }
    }

    /// Time limits in effect.
    pub fn config(&self) -> RunnerConfig {
        self.config
    }

    /// Start a run on its own task and hand back the progress stream.
    ///
    /// The run does not depend on anyone reading the stream: dropping the
    /// receiver only stops delivery, the run still finishes and persists.
    pub fn spawn(
        self: &Arc<Self>,
        document: Document,
        buffer: usize,
    ) -> (mpsc::Receiver<ProgressUpdate>, JoinHandle<Result<CompletedRun, PipelineError>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let runner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let sink = ProgressSink::with_budget(tx, runner.config.overall_timeout);
            runner.run(document, sink).await
        });
        (rx, handle)
    }

    /// Run to completion on the current task, reporting through `sink`.
    #[tracing::instrument(skip_all, fields(document_id = %document.id, user_id = %document.owner_id))]
    pub async fn run(&self, document: Document, mut sink: ProgressSink) -> Result<CompletedRun, PipelineError> {
        let started = Instant::now();
        let deadline = started + self.config.overall_timeout;
        let mut tracker = ProgressTracker::new(self.graph.node_ids().len());

        let generation = match self.documents.begin_run(document.id).await {
            Ok(generation) => generation,
            Err(e) => {
                let err = PipelineError::Persistence(e.to_string());
                Self::record_failure(&err, started);
                sink.send(tracker.error(err.to_string())).await;
                return Err(err);
            }
        };
        tracing::info!(generation, "analysis run started");
        sink.send(tracker.initializing()).await;

        match self.execute(&document, generation, deadline, &mut tracker, &mut sink).await {
            Ok(run) => {
                metrics::counter!("docaudit_pipeline_runs_total", "outcome" => "completed").increment(1);
                tracing::info!(
                    outcome = "completed",
                    generation,
                    overall_score = run.report.overall_score,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "analysis run finished"
                );
                sink.send(tracker.complete(run.report.clone())).await;
                Ok(run)
            }
            Err(err) => {
                Self::record_failure(&err, started);
                match self.documents.mark_error(document.id, generation).await {
                    Ok(true) => {}
                    Ok(false) => tracing::info!(generation, "a newer run owns the document status, leaving it"),
                    Err(e) => tracing::error!(error = %e, "failed to mark document as errored"),
                }
                sink.send(tracker.error(err.to_string())).await;
                Err(err)
            }
        }
    }

    fn record_failure(err: &PipelineError, started: Instant) {
        metrics::counter!("docaudit_pipeline_runs_total", "outcome" => err.kind()).increment(1);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match err {
            PipelineError::Timeout(limit) => {
                tracing::warn!(outcome = "timeout", limit_ms = limit.as_millis() as u64, elapsed_ms, "analysis run timed out");
            }
            other => tracing::error!(outcome = other.kind(), error = %other, elapsed_ms, "analysis run failed"),
        }
    }

    async fn execute(
        &self,
        document: &Document,
        generation: i64,
        deadline: Instant,
        tracker: &mut ProgressTracker,
        sink: &mut ProgressSink,
    ) -> Result<CompletedRun, PipelineError> {
        let input = StageInput {
            document_id: document.id,
            user_id: document.owner_id.clone(),
            content: document.content.clone(),
        };

        let state = self.run_graph(input, deadline, tracker, sink).await?;

        let report = state
            .final_report
            .ok_or_else(|| PipelineError::Incomplete("stage graph finished without a final report".to_string()))?
            .validated()
            .map_err(|e| PipelineError::Incomplete(e.to_string()))?;

        sink.send(tracker.persisting()).await;

        let commit = AnalysisCommit::new(document.id, generation, report);
        let outcome = self
            .persistence
            .commit(&commit)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(CompletedRun {
            report: commit.report,
            outcome,
            generation,
        })
    }

    async fn run_graph(
        &self,
        input: StageInput,
        deadline: Instant,
        tracker: &mut ProgressTracker,
        sink: &mut ProgressSink,
    ) -> Result<GraphState, PipelineError> {
        let overall = self.config.overall_timeout;

        let mut rx = match tokio::time::timeout_at(deadline, self.graph.stream(input.clone())).await {
            Err(_) => return Err(PipelineError::Timeout(overall)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "stage graph could not stream, falling back to blocking invocation");
                return self.invoke_fallback(input, deadline, tracker, sink).await;
            }
            Ok(Ok(rx)) => rx,
        };

        let mut observed = false;
        loop {
            let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return Err(PipelineError::Timeout(overall)),
                Ok(None) if !observed => {
                    tracing::warn!("stage graph stream closed before any event, falling back to blocking invocation");
                    return self.invoke_fallback(input, deadline, tracker, sink).await;
                }
                Ok(None) => {
                    return Err(PipelineError::Execution("stage graph stream ended before completion".to_string()));
                }
                Ok(Some(event)) => event,
            };
            observed = true;

            match event {
                StageEvent::Started { node } => {
                    tracing::debug!(stage = %node, "stage started");
                    sink.send(tracker.stage_started(&node)).await;
                }
                StageEvent::Finished { node, outputs } => {
                    for output in &outputs {
                        Self::emit_side_channel(output, tracker, sink).await;
                    }
                    let update = tracker.stage_finished(&node);
                    tracing::debug!(stage = %node, progress = update.progress(), "stage finished");
                    sink.send(update).await;
                }
                StageEvent::Failed { node, error } => {
                    return Err(PipelineError::Execution(format!("stage {node} failed: {error}")));
                }
                StageEvent::Completed { state } => return Ok(*state),
            }
        }
    }

    async fn invoke_fallback(
        &self,
        input: StageInput,
        deadline: Instant,
        tracker: &mut ProgressTracker,
        sink: &mut ProgressSink,
    ) -> Result<GraphState, PipelineError> {
        metrics::counter!("docaudit_pipeline_fallbacks_total").increment(1);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = self.config.fallback_timeout.min(remaining);

        let state = match tokio::time::timeout(budget, self.graph.invoke(input)).await {
            Err(_) => return Err(PipelineError::Timeout(budget)),
            Ok(Err(e)) => return Err(PipelineError::Execution(e.to_string())),
            Ok(Ok(state)) => state,
        };

        if let Some(biases) = &state.biases {
            Self::emit_side_channel(&StageOutput::Biases(biases.clone()), tracker, sink).await;
        }
        if let Some(noise) = &state.noise {
            Self::emit_side_channel(&StageOutput::Noise(noise.clone()), tracker, sink).await;
        }
        for node in self.graph.node_ids() {
            sink.send(tracker.stage_finished(&node)).await;
        }

        Ok(state)
    }

    /// Live narration of detections; never affects the report.
    async fn emit_side_channel(output: &StageOutput, tracker: &mut ProgressTracker, sink: &mut ProgressSink) {
        match output {
            StageOutput::Biases(biases) => {
                for bias in biases.iter().filter(|b| b.found) {
                    sink.send(tracker.bias(bias)).await;
                }
            }
            StageOutput::Noise(stats) => sink.send(tracker.noise(stats.mean)).await,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAnalysisRepository, SqliteDocumentRepository};
    use crate::adapters::stages::{
        scripted_audit_graph, ScriptedGraph, ScriptedStage, SequentialStageGraph, StreamMode,
    };
    use crate::domain::models::{BiasFinding, DocumentStatus, Severity};
    use crate::domain::ports::{AnalysisRepository, NullEmbeddingStore};
    use sqlx::SqlitePool;

    fn finding(bias_type: &str, severity: Severity, found: bool) -> BiasFinding {
        BiasFinding {
            bias_type: bias_type.into(),
            found,
            severity,
            excerpt: "obviously".into(),
            explanation: String::new(),
            suggestion: String::new(),
            confidence: 0.8,
        }
    }

    fn audit_graph() -> SequentialStageGraph {
        scripted_audit_graph(
            vec![
                finding("confirmation", Severity::High, true),
                finding("overconfidence", Severity::Critical, true),
                finding("sunk_cost", Severity::Low, false),
            ],
            vec![60.0, 62.0, 64.0],
        )
        .unwrap()
    }

    struct Harness {
        pool: SqlitePool,
        documents: Arc<SqliteDocumentRepository>,
        analyses: Arc<SqliteAnalysisRepository>,
    }

    impl Harness {
        async fn new() -> Self {
            let pool = create_migrated_test_pool().await.unwrap();
            Self {
                documents: Arc::new(SqliteDocumentRepository::new(pool.clone())),
                analyses: Arc::new(SqliteAnalysisRepository::new(pool.clone(), Duration::from_secs(300))),
                pool,
            }
        }

        fn runner(&self, graph: Arc<dyn StageGraph>, config: RunnerConfig) -> Arc<PipelineRunner> {
            let persistence = Arc::new(ResilientPersistence::new(
                self.analyses.clone(),
                Arc::new(NullEmbeddingStore),
            ));
            Arc::new(PipelineRunner::new(graph, self.documents.clone(), persistence, config))
        }

        async fn document(&self) -> Document {
            let doc = Document::new("alice", "memo.txt", "We must acquire them before Q3.");
            self.documents.create(&doc).await.unwrap();
            doc
        }

        async fn status(&self, doc: &Document) -> DocumentStatus {
            self.documents.get(doc.id).await.unwrap().unwrap().status
        }
    }

    fn config() -> RunnerConfig {
        RunnerConfig {
            overall_timeout: Duration::from_secs(10),
            fallback_timeout: Duration::from_secs(5),
        }
    }

    async fn collect(runner: &Arc<PipelineRunner>, doc: Document) -> (Vec<ProgressUpdate>, Result<CompletedRun, PipelineError>) {
        let (mut rx, handle) = runner.spawn(doc, 16);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (events, handle.await.unwrap())
    }

    fn assert_well_formed(events: &[ProgressUpdate]) {
        assert!(events.windows(2).all(|w| w[0].progress() <= w[1].progress()), "{events:?}");
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_streaming_run_narrates_and_commits() {
        let h = Harness::new().await;
        let runner = h.runner(Arc::new(audit_graph()), config());
        let doc = h.document().await;

        let (events, result) = collect(&runner, doc.clone()).await;
        let run = result.unwrap();

        assert_well_formed(&events);
        assert_eq!(events[0].progress(), 5);
        assert_eq!(events.iter().filter(|e| e.kind() == "bias").count(), 2);
        let noise: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressUpdate::Noise { result, .. } => Some(result.score),
                _ => None,
            })
            .collect();
        assert_eq!(noise.len(), 1);
        assert!((noise[0] - 62.0).abs() < 1e-9);

        // 11 starts + 11 ends + initializing + persisting
        assert_eq!(events.iter().filter(|e| e.kind() == "step").count(), 24);
        assert!(matches!(events.last(), Some(ProgressUpdate::Complete { progress: 100, .. })));

        assert_eq!(run.report.biases.len(), 2);
        assert_eq!(h.status(&doc).await, DocumentStatus::Complete);
        let record = h.analyses.latest_for_document(doc.id).await.unwrap().unwrap();
        assert_eq!(record.biases.len(), 2);
        assert!(record.sections.fact_check.is_some());
    }

    #[tokio::test]
    async fn test_refused_stream_falls_back_to_invoke() {
        let h = Harness::new().await;
        let graph = Arc::new(ScriptedGraph::new(audit_graph(), StreamMode::RefuseToStream));
        let runner = h.runner(graph.clone(), config());
        let doc = h.document().await;

        let (events, result) = collect(&runner, doc.clone()).await;
        assert!(result.is_ok());
        assert_eq!(graph.invocations(), 1);
        assert_well_formed(&events);
        assert_eq!(events.iter().filter(|e| e.kind() == "bias").count(), 2);
        assert_eq!(h.status(&doc).await, DocumentStatus::Complete);
    }

    #[tokio::test]
    async fn test_silent_stream_falls_back_to_invoke() {
        let h = Harness::new().await;
        let graph = Arc::new(ScriptedGraph::new(audit_graph(), StreamMode::CloseImmediately));
        let runner = h.runner(graph.clone(), config());

        let (_, result) = collect(&runner, h.document().await).await;
        assert!(result.is_ok());
        assert_eq!(graph.invocations(), 1);
    }

    #[tokio::test]
    async fn test_stage_failure_after_events_does_not_fall_back() {
        let h = Harness::new().await;
        let inner = SequentialStageGraph::new(vec![
            Arc::new(ScriptedStage::new("structurer", vec![])),
            Arc::new(ScriptedStage::failing("bias_detective", "model overloaded")),
        ])
        .unwrap();
        let graph = Arc::new(ScriptedGraph::new(inner, StreamMode::Normal));
        let runner = h.runner(graph.clone(), config());
        let doc = h.document().await;

        let (events, result) = collect(&runner, doc.clone()).await;
        assert!(matches!(result, Err(PipelineError::Execution(ref m)) if m.contains("model overloaded")));
        assert_eq!(graph.invocations(), 0);
        assert_well_formed(&events);
        assert!(matches!(events.last(), Some(ProgressUpdate::Error { .. })));
        assert_eq!(h.status(&doc).await, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_report_is_incomplete() {
        let h = Harness::new().await;
        let graph = SequentialStageGraph::new(vec![Arc::new(ScriptedStage::new("structurer", vec![]))]).unwrap();
        let runner = h.runner(Arc::new(graph), config());
        let doc = h.document().await;

        let (events, result) = collect(&runner, doc.clone()).await;
        assert!(matches!(result, Err(PipelineError::Incomplete(_))));
        assert_eq!(events.iter().filter(|e| e.kind() == "complete").count(), 0);
        assert_eq!(h.status(&doc).await, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn test_overall_timeout_on_streaming_path() {
        let h = Harness::new().await;
        let graph = SequentialStageGraph::new(vec![Arc::new(
            ScriptedStage::new("structurer", vec![]).with_delay(Duration::from_secs(30)),
        )])
        .unwrap();
        let runner = h.runner(
            Arc::new(graph),
            RunnerConfig {
                overall_timeout: Duration::from_millis(200),
                fallback_timeout: Duration::from_millis(100),
            },
        );
        let doc = h.document().await;

        let (events, result) = collect(&runner, doc.clone()).await;
        assert_eq!(result.unwrap_err(), PipelineError::Timeout(Duration::from_millis(200)));
        assert_eq!(result_kind(&events), "error");
        assert_eq!(h.status(&doc).await, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn test_fallback_uses_shorter_ceiling() {
        let h = Harness::new().await;
        let inner = SequentialStageGraph::new(vec![Arc::new(
            ScriptedStage::new("structurer", vec![]).with_delay(Duration::from_secs(30)),
        )])
        .unwrap();
        let runner = h.runner(
            Arc::new(ScriptedGraph::new(inner, StreamMode::RefuseToStream)),
            RunnerConfig {
                overall_timeout: Duration::from_secs(5),
                fallback_timeout: Duration::from_millis(100),
            },
        );

        let (_, result) = collect(&runner, h.document().await).await;
        assert_eq!(result.unwrap_err(), PipelineError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_fatal_storage_error_marks_document_error() {
        let h = Harness::new().await;
        sqlx::raw_sql(
            "CREATE TRIGGER reject_analyses BEFORE INSERT ON analyses BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END;",
        )
        .execute(&h.pool)
        .await
        .unwrap();
        let runner = h.runner(Arc::new(audit_graph()), config());
        let doc = h.document().await;

        let (events, result) = collect(&runner, doc.clone()).await;
        assert!(matches!(result, Err(PipelineError::Persistence(ref m)) if m.contains("disk quota exceeded")));
        assert_well_formed(&events);
        assert_eq!(result_kind(&events), "error");
        assert_eq!(h.status(&doc).await, DocumentStatus::Error);
    }

    #[tokio::test]
    async fn test_run_survives_client_disconnect() {
        let h = Harness::new().await;
        let runner = h.runner(Arc::new(audit_graph()), config());
        let doc = h.document().await;

        let (rx, handle) = runner.spawn(doc.clone(), 1);
        drop(rx);

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(h.status(&doc).await, DocumentStatus::Complete);
    }

    #[tokio::test]
    async fn test_missing_document_fails_before_initializing() {
        let h = Harness::new().await;
        let runner = h.runner(Arc::new(audit_graph()), config());
        let ghost = Document::new("alice", "ghost.txt", "never stored");

        let (events, result) = collect(&runner, ghost).await;
        assert!(matches!(result, Err(PipelineError::Persistence(_))));
        assert_eq!(events.len(), 1);
        assert_eq!(result_kind(&events), "error");
    }

    fn result_kind(events: &[ProgressUpdate]) -> &'static str {
        events.last().map_or("none", ProgressUpdate::kind)
    }
}
