//! Final risk scoring: fold the accumulated state into the audit report.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    fallback_overall_score, AuditReport, ExtendedSections, GraphState, RiskAssessment, StageOutput,
    StandardStage,
};
use crate::domain::ports::AnalysisStage;

/// Builds the final report. When a scoring model is configured its overall
/// score and summary win; otherwise the legacy deduction formula applies.
pub struct RiskScorerStage {
    model: Option<Arc<dyn AnalysisStage>>,
}

impl RiskScorerStage {
    /// Create a scorer; without a model the deduction formula is used.
    pub fn new(model: Option<Arc<dyn AnalysisStage>>) -> Self {
        Self { model }
    }
}

/// Assemble a report from the graph state and the scoring verdict.
pub fn assemble_report(state: &GraphState, risk: &RiskAssessment) -> AuditReport {
    let biases: Vec<_> = state
        .biases
        .iter()
        .flatten()
        .filter(|b| b.found)
        .cloned()
        .collect();
    let noise_score = state.noise.as_ref().map_or(0.0, |n| n.noise_score());
    let overall_score = risk
        .overall_score
        .unwrap_or_else(|| fallback_overall_score(&biases, noise_score));

    AuditReport {
        overall_score,
        noise_score,
        summary: risk.summary.clone().unwrap_or_default(),
        biases,
        sections: ExtendedSections {
            noise_stats: state.noise.clone(),
            fact_check: state.fact_check.clone(),
            compliance: state.compliance.clone(),
            swot: state.swot.clone(),
            simulation: state.simulation.clone(),
            institutional_memory: state.institutional_memory.clone(),
            sentiment: state.sentiment.clone(),
            logical_analysis: state.logical_analysis.clone(),
            pre_mortem: state.pre_mortem.clone(),
            cognitive_diversity: state.cognitive_diversity.clone(),
        },
    }
}

#[async_trait]
impl AnalysisStage for RiskScorerStage {
    fn id(&self) -> &str {
        StandardStage::RiskScorer.id()
    }

    async fn run(&self, state: &GraphState) -> DomainResult<Vec<StageOutput>> {
        let mut risk = state.risk.clone().unwrap_or_default();

        if let Some(model) = &self.model {
            for output in model.run(state).await? {
                match output {
                    StageOutput::RiskAssessment(r) => risk = r,
                    other => tracing::debug!(?other, "ignoring non-risk output from scoring model"),
                }
            }
        }

        if risk.overall_score.is_none() {
            tracing::info!(document_id = %state.input.document_id, "no model score, using deduction formula");
        }

        let report = assemble_report(state, &risk);
        Ok(vec![StageOutput::RiskAssessment(risk), StageOutput::Report(report)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stages::ScriptedStage;
    use crate::domain::models::{BiasFinding, NoiseStats, Severity, StageInput};
    use uuid::Uuid;

    fn bias(severity: Severity, found: bool) -> BiasFinding {
        BiasFinding {
            bias_type: "anchoring".into(),
            found,
            severity,
            excerpt: String::new(),
            explanation: String::new(),
            suggestion: String::new(),
            confidence: 0.5,
        }
    }

    fn state() -> GraphState {
        let mut state = GraphState::new(StageInput {
            document_id: Uuid::new_v4(),
            user_id: "alice".into(),
            content: "text".into(),
        });
        state.biases = Some(vec![bias(Severity::High, true), bias(Severity::Critical, true), bias(Severity::Low, false)]);
        state.noise = NoiseStats::from_scores(&[50.0, 60.0, 70.0], None);
        state
    }

    #[tokio::test]
    async fn test_fallback_formula_without_model() {
        let outputs = RiskScorerStage::new(None).run(&state()).await.unwrap();
        let Some(StageOutput::Report(report)) = outputs.last() else {
            panic!("expected report");
        };
        assert_eq!(report.biases.len(), 2);
        // std_dev 8.16 -> noise 16.32; 100 - 30 - 3.264
        assert!((report.noise_score - 16.32).abs() < 1e-9);
        assert!((report.overall_score - 66.736).abs() < 1e-9);
        assert!(report.sections.noise_stats.is_some());
    }

    #[tokio::test]
    async fn test_model_score_is_authoritative() {
        let model = ScriptedStage::new(
            "risk_scorer",
            vec![StageOutput::RiskAssessment(RiskAssessment {
                overall_score: Some(41.0),
                summary: Some("Risky.".into()),
            })],
        );
        let outputs = RiskScorerStage::new(Some(Arc::new(model))).run(&state()).await.unwrap();
        let Some(StageOutput::Report(report)) = outputs.last() else {
            panic!("expected report");
        };
        assert!((report.overall_score - 41.0).abs() < f64::EPSILON);
        assert_eq!(report.summary, "Risky.");
    }
}
