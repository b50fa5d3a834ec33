//! Noise judging: poll a panel of independent judges and measure how much
//! their scores disagree.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GraphState, NoiseStats, StageOutput, StandardStage};
use crate::domain::ports::AnalysisStage;

/// Runs a panel of independent judges and summarizes their spread.
pub struct NoiseJudgeStage {
    judge: Arc<dyn AnalysisStage>,
    panel_size: usize,
}

impl NoiseJudgeStage {
    /// `judge` is asked `panel_size` times, concurrently; each call must
    /// answer with `judge_scores`.
    pub fn new(judge: Arc<dyn AnalysisStage>, panel_size: usize) -> Self {
        Self {
            judge,
            panel_size: panel_size.max(1),
        }
    }
}

#[async_trait]
impl AnalysisStage for NoiseJudgeStage {
    fn id(&self) -> &str {
        StandardStage::NoiseJudge.id()
    }

    async fn run(&self, state: &GraphState) -> DomainResult<Vec<StageOutput>> {
        let verdicts = join_all((0..self.panel_size).map(|_| self.judge.run(state))).await;

        let mut scores = Vec::with_capacity(self.panel_size);
        let mut failures = 0usize;
        for verdict in verdicts {
            match verdict {
                Ok(outputs) => scores.extend(outputs.into_iter().flat_map(|o| match o {
                    StageOutput::JudgeScores(s) => s,
                    _ => Vec::new(),
                })),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, "noise judge failed");
                }
            }
        }
        scores.retain(|s| s.is_finite());

        let stats = NoiseStats::from_scores(&scores, None).ok_or_else(|| {
            DomainError::ExecutionFailed(format!("no judge produced a score ({failures} of {} failed)", self.panel_size))
        })?;

        tracing::debug!(judges = scores.len(), mean = stats.mean, std_dev = stats.std_dev, "noise measured");
        Ok(vec![StageOutput::JudgeScores(scores), StageOutput::Noise(stats)])
    }
}
