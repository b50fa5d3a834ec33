//! Stage-graph ports: the execution engine and the individual stages it runs.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{GraphState, StageEvent, StageInput, StageOutput};

/// One opaque analysis step.
///
/// A stage sees the state accumulated so far and returns the typed sections
/// it produced. What a stage asks a model is not the runner's concern.
#[async_trait]
pub trait AnalysisStage: Send + Sync {
    /// Stable stage identifier (e.g. `bias_detective`).
    fn id(&self) -> &str;

    async fn run(&self, state: &GraphState) -> DomainResult<Vec<StageOutput>>;
}

/// Execution engine for a fixed, ordered set of stages.
#[async_trait]
pub trait StageGraph: Send + Sync {
    /// Stage identifiers in execution order.
    fn node_ids(&self) -> Vec<String>;

    /// Start the graph and stream lifecycle events.
    ///
    /// An `Err` here means the engine could not start streaming at all. The
    /// receiver yields `Started`/`Finished` per stage and ends with
    /// `Completed` on success; a channel that closes without `Completed`
    /// means the run failed.
    async fn stream(&self, input: StageInput) -> DomainResult<mpsc::Receiver<StageEvent>>;

    /// Run every stage to completion and return the final aggregate state.
    async fn invoke(&self, input: StageInput) -> DomainResult<GraphState>;
}
