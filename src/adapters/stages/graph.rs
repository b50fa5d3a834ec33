//! Sequential stage-graph engine.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GraphState, StageEvent, StageInput, StageOutput};
use crate::domain::ports::{AnalysisStage, StageGraph};

const EVENT_BUFFER: usize = 64;

/// Runs its stages one after another, each seeing the state built by the
/// ones before it.
#[derive(Clone)]
pub struct SequentialStageGraph {
    stages: Vec<Arc<dyn AnalysisStage>>,
}

impl SequentialStageGraph {
    /// Build a graph from ordered stages. At least one stage is required.
    pub fn new(stages: Vec<Arc<dyn AnalysisStage>>) -> DomainResult<Self> {
        if stages.is_empty() {
            return Err(DomainError::ValidationFailed("stage graph needs at least one stage".to_string()));
        }
        Ok(Self { stages })
    }

    async fn run_stage(stage: &dyn AnalysisStage, state: &mut GraphState) -> DomainResult<Vec<StageOutput>> {
        let outputs = stage.run(state).await?;
        for output in outputs.iter().cloned() {
            state.apply(output);
        }
        Ok(outputs)
    }
}

#[async_trait]
impl StageGraph for SequentialStageGraph {
    fn node_ids(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.id().to_string()).collect()
    }

    async fn stream(&self, input: StageInput) -> DomainResult<mpsc::Receiver<StageEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let stages = self.stages.clone();

        tokio::spawn(async move {
            let mut state = GraphState::new(input);

            for stage in &stages {
                let node = stage.id().to_string();
                if tx.send(StageEvent::Started { node: node.clone() }).await.is_err() {
                    return;
                }

                match Self::run_stage(stage.as_ref(), &mut state).await {
                    Ok(outputs) => {
                        if tx.send(StageEvent::Finished { node, outputs }).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(stage = %node, error = %e, "stage failed");
                        let _ = tx.send(StageEvent::Failed { node, error: e.to_string() }).await;
                        return;
                    }
                }
            }

            let _ = tx.send(StageEvent::Completed { state: Box::new(state) }).await;
        });

        Ok(rx)
    }

    async fn invoke(&self, input: StageInput) -> DomainResult<GraphState> {
        let mut state = GraphState::new(input);
        for stage in &self.stages {
            Self::run_stage(stage.as_ref(), &mut state)
                .await
                .map_err(|e| DomainError::ExecutionFailed(format!("stage {} failed: {e}", stage.id())))?;
        }
        Ok(state)
    }
}

/// Stand-in graph for a server started without a stage worker. Every run
/// fails with the configured reason.
#[derive(Debug, Clone)]
pub struct UnavailableStageGraph {
    reason: String,
}

impl UnavailableStageGraph {
    /// Create a graph that fails every run with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl StageGraph for UnavailableStageGraph {
    fn node_ids(&self) -> Vec<String> {
        Vec::new()
    }

    async fn stream(&self, _input: StageInput) -> DomainResult<mpsc::Receiver<StageEvent>> {
        Err(DomainError::ExecutionFailed(self.reason.clone()))
    }

    async fn invoke(&self, _input: StageInput) -> DomainResult<GraphState> {
        Err(DomainError::ExecutionFailed(self.reason.clone()))
    }
}
