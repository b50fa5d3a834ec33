//! Scripted stages and graphs for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{NoiseJudgeStage, RiskScorerStage, SequentialStageGraph};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BiasFinding, DocumentStructure, FactCheck, FactVerification, GraphState, StageEvent, StageInput,
    StageOutput, StandardStage,
};
use crate::domain::ports::{AnalysisStage, StageGraph};

/// A stage that returns canned outputs, optionally after a delay or with a
/// failure.
#[derive(Debug, Clone)]
pub struct ScriptedStage {
    id: String,
    outputs: Vec<StageOutput>,
    error: Option<String>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedStage {
    /// A stage answering `outputs` on every run.
    pub fn new(id: impl Into<String>, outputs: Vec<StageOutput>) -> Self {
        Self {
            id: id.into(),
            outputs,
            error: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A stage failing every run with `error`.
    pub fn failing(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(id, Vec::new())
        }
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `run` has been called, shared across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisStage for ScriptedStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, _state: &GraphState) -> DomainResult<Vec<StageOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.error {
            Some(error) => Err(DomainError::ExecutionFailed(error.clone())),
            None => Ok(self.outputs.clone()),
        }
    }
}

/// How a [`ScriptedGraph`] misbehaves when asked to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Delegate to the wrapped graph
    Normal,
    /// Fail before any stage event
    RefuseToStream,
    /// Open a stream that closes without a single event
    CloseImmediately,
}

/// Wraps a graph and lets tests force the streaming path to fail.
pub struct ScriptedGraph<G> {
    inner: G,
    mode: StreamMode,
    invocations: AtomicUsize,
}

impl<G: StageGraph> ScriptedGraph<G> {
    /// Wrap `inner`, misbehaving as `mode` says when streamed.
    pub fn new(inner: G, mode: StreamMode) -> Self {
        Self {
            inner,
            mode,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Number of blocking invocations served.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<G: StageGraph> StageGraph for ScriptedGraph<G> {
    fn node_ids(&self) -> Vec<String> {
        self.inner.node_ids()
    }

    async fn stream(&self, input: StageInput) -> DomainResult<mpsc::Receiver<StageEvent>> {
        match self.mode {
            StreamMode::Normal => self.inner.stream(input).await,
            StreamMode::RefuseToStream => Err(DomainError::ExecutionFailed("streaming unsupported".to_string())),
            StreamMode::CloseImmediately => {
                let (_tx, rx) = mpsc::channel(1);
                Ok(rx)
            }
        }
    }

    async fn invoke(&self, input: StageInput) -> DomainResult<GraphState> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.inner.invoke(input).await
    }
}

/// The standard 11 stages with canned model answers: the bias detector
/// reports `biases`, a single noise judge answers `judge_scores`, the fact
/// checker verifies one claim, and the risk scorer falls back to the
/// deduction formula.
pub fn scripted_audit_graph(biases: Vec<BiasFinding>, judge_scores: Vec<f64>) -> DomainResult<SequentialStageGraph> {
    let stages = StandardStage::ORDER
        .into_iter()
        .map(|stage| -> Arc<dyn AnalysisStage> {
            match stage {
                StandardStage::Structurer => Arc::new(ScriptedStage::new(
                    stage.id(),
                    vec![StageOutput::Structure(DocumentStructure {
                        sections: vec!["Proposal".into()],
                        key_claims: vec!["Revenue doubles".into()],
                        word_count: 120,
                    })],
                )),
                StandardStage::BiasDetective => {
                    Arc::new(ScriptedStage::new(stage.id(), vec![StageOutput::Biases(biases.clone())]))
                }
                StandardStage::NoiseJudge => Arc::new(NoiseJudgeStage::new(
                    Arc::new(ScriptedStage::new("judge", vec![StageOutput::JudgeScores(judge_scores.clone())])),
                    1,
                )),
                StandardStage::FactChecker => Arc::new(ScriptedStage::new(
                    stage.id(),
                    vec![StageOutput::FactCheck(FactCheck {
                        score: 80.0,
                        verifications: vec![FactVerification {
                            claim: "Revenue doubles".into(),
                            verdict: "VERIFIED".into(),
                            explanation: None,
                        }],
                    })],
                )),
                StandardStage::RiskScorer => Arc::new(RiskScorerStage::new(None)),
                _ => Arc::new(ScriptedStage::new(stage.id(), Vec::new())),
            }
        })
        .collect();

    SequentialStageGraph::new(stages)
}
