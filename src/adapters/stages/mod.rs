//! Stage-graph adapters: the execution engine and the stages it runs.

pub mod graph;
pub mod http_stage;
pub mod noise_judge;
pub mod risk_scorer;
pub mod scripted;

pub use graph::{SequentialStageGraph, UnavailableStageGraph};
pub use http_stage::{stage_client, HttpStage};
pub use noise_judge::NoiseJudgeStage;
pub use risk_scorer::{assemble_report, RiskScorerStage};
pub use scripted::{scripted_audit_graph, ScriptedGraph, ScriptedStage, StreamMode};

use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{PipelineConfig, StandardStage};
use crate::domain::ports::AnalysisStage;

/// Build the standard 11-stage graph against the configured stage worker.
pub fn standard_graph(config: &PipelineConfig) -> DomainResult<SequentialStageGraph> {
    let base_url = config
        .stage_worker_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| DomainError::ValidationFailed("pipeline.stage_worker_url is not set".to_string()))?;
    let client = stage_client(Duration::from_secs(config.stage_request_timeout_secs))?;

    let stages = StandardStage::ORDER
        .into_iter()
        .map(|stage| -> Arc<dyn AnalysisStage> {
            let remote: Arc<dyn AnalysisStage> = Arc::new(HttpStage::new(stage.id(), base_url, client.clone()));
            match stage {
                StandardStage::NoiseJudge => Arc::new(NoiseJudgeStage::new(remote, config.noise_panel_size)),
                StandardStage::RiskScorer => Arc::new(RiskScorerStage::new(Some(remote))),
                _ => remote,
            }
        })
        .collect();

    SequentialStageGraph::new(stages)
}
