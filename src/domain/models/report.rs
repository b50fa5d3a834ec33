//! Audit report model.
//!
//! The report is the single aggregated output of a pipeline run. Core fields
//! (`overall_score`, `noise_score`, `summary`, `biases`) are always present;
//! every other section is optional because a stage may be skipped or the
//! storage schema may not carry it yet.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordered bias severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    /// Every severity, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Wire form of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a severity, ignoring case and surrounding whitespace.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Points removed from the legacy overall score per bias of this severity.
    pub const fn score_deduction(&self) -> f64 {
        match self {
            Self::Low => 2.0,
            Self::Medium => 5.0,
            Self::High => 10.0,
            Self::Critical => 20.0,
        }
    }
}

const fn default_found() -> bool {
    true
}

/// A bias reported by the bias-detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasFinding {
    pub bias_type: String,
    #[serde(default = "default_found")]
    pub found: bool,
    pub severity: Severity,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Statistics over independent judge scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub variance: f64,
    #[serde(default)]
    pub raw_scores: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mse: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_component: Option<f64>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl NoiseStats {
    /// Compute noise statistics for a panel of independent judgments.
    ///
    /// Variance is the population variance; the median is the upper median
    /// (`sorted[n / 2]`). Every statistic is rounded to 2 decimals. When a
    /// target value is known the mean squared error is decomposed as
    /// `bias^2 + variance`.
    pub fn from_scores(scores: &[f64], target: Option<f64>) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        let median = sorted[sorted.len() / 2];

        let (mse, bias_component) = match target {
            Some(target) => {
                let bias = mean - target;
                (Some(round2(bias.powi(2) + variance)), Some(round2(bias)))
            }
            None => (None, None),
        };

        Some(Self {
            mean: round2(mean),
            median: round2(median),
            std_dev: round2(variance.sqrt()),
            variance: round2(variance),
            raw_scores: scores.to_vec(),
            mse,
            bias_component,
        })
    }

    /// Noise on the 0-100 scale: judge spread (max 50 for 0-100 judgments)
    /// scaled by two and clamped.
    pub fn noise_score(&self) -> f64 {
        (self.std_dev * 2.0).clamp(0.0, 100.0)
    }
}

/// Verdict on one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactVerification {
    pub claim: String,
    pub verdict: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Fact-check section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactCheck {
    pub score: f64,
    #[serde(default)]
    pub verifications: Vec<FactVerification>,
}

/// Assessment against one regulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegulationAssessment {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Compliance section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compliance {
    pub score: f64,
    #[serde(default)]
    pub regulations: Vec<RegulationAssessment>,
}

/// SWOT section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swot {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub threats: Vec<String>,
}

/// One simulated boardroom persona and its vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinVote {
    pub persona: String,
    pub vote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Boardroom simulation section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    #[serde(default)]
    pub twins: Vec<TwinVote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
}

/// A comparable earlier decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastDecision {
    pub title: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub similarity: f64,
}

/// Institutional-memory section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionalMemory {
    #[serde(default)]
    pub similar_decisions: Vec<PastDecision>,
    #[serde(default)]
    pub lessons: Vec<String>,
}

/// Sentiment polarity in [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentiment {
    pub score: f64,
    #[serde(default)]
    pub label: String,
}

impl Sentiment {
    /// Objectivity on the 0-100 scale: strongly polarized text is less objective.
    pub fn objectivity(&self) -> f64 {
        (100.0 - self.score.abs().min(1.0) * 100.0).clamp(0.0, 100.0)
    }
}

/// One detected fallacy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fallacy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Logical-analysis section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalAnalysis {
    pub score: f64,
    #[serde(default)]
    pub fallacies: Vec<Fallacy>,
}

/// Pre-mortem section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreMortem {
    #[serde(default)]
    pub failure_scenarios: Vec<String>,
    #[serde(default)]
    pub mitigations: Vec<String>,
}

/// Red-team section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveDiversity {
    #[serde(default)]
    pub blind_spots: Vec<String>,
    #[serde(default)]
    pub counter_arguments: Vec<String>,
}

/// The optional, independently-present sections of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedSections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_stats: Option<NoiseStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_check: Option<FactCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<Compliance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swot: Option<Swot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation: Option<Simulation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institutional_memory: Option<InstitutionalMemory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_analysis: Option<LogicalAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_mortem: Option<PreMortem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognitive_diversity: Option<CognitiveDiversity>,
}

impl ExtendedSections {
    /// Whether no extended section is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Final aggregated report of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub overall_score: f64,
    pub noise_score: f64,
    pub summary: String,
    #[serde(default)]
    pub biases: Vec<BiasFinding>,
    #[serde(flatten)]
    pub sections: ExtendedSections,
}

/// Errors raised while validating a report at the pipeline-output boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReportError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
}

fn finite(value: f64, field: &'static str) -> Result<f64, ReportError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ReportError::NonFinite { field })
    }
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

impl AuditReport {
    /// Validate and normalize the report once, at the pipeline boundary.
    ///
    /// Scores are clamped into [0, 100] and confidences into [0, 1]; biases
    /// not marked found are dropped and the rest normalized to `found`.
    pub fn validated(mut self) -> Result<Self, ReportError> {
        self.overall_score = clamp_score(finite(self.overall_score, "overallScore")?);
        self.noise_score = clamp_score(finite(self.noise_score, "noiseScore")?);

        self.biases.retain(|b| b.found);
        for bias in &mut self.biases {
            bias.found = true;
            bias.confidence = if bias.confidence.is_finite() {
                bias.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        if let Some(fc) = self.sections.fact_check.as_mut() {
            fc.score = clamp_score(finite(fc.score, "factCheck.score")?);
        }
        if let Some(c) = self.sections.compliance.as_mut() {
            c.score = clamp_score(finite(c.score, "compliance.score")?);
        }
        if let Some(la) = self.sections.logical_analysis.as_mut() {
            la.score = clamp_score(finite(la.score, "logicalAnalysis.score")?);
        }
        if let Some(s) = self.sections.sentiment.as_mut() {
            s.score = finite(s.score, "sentiment.score")?.clamp(-1.0, 1.0);
        }

        if self.summary.trim().is_empty() {
            self.summary = default_summary(&self.biases, self.overall_score);
        }

        Ok(self)
    }

    /// Number of biases at `severity`.
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.biases.iter().filter(|b| b.severity == severity).count()
    }
}

/// Legacy overall-score formula, used only when the scoring model did not
/// provide an overall score.
pub fn fallback_overall_score(biases: &[BiasFinding], noise_score: f64) -> f64 {
    let deductions: f64 = biases
        .iter()
        .filter(|b| b.found)
        .map(|b| b.severity.score_deduction())
        .sum();
    (100.0 - deductions - noise_score * 0.2).clamp(0.0, 100.0)
}

/// Summary used when the scoring stage produced none.
pub fn default_summary(biases: &[BiasFinding], overall_score: f64) -> String {
    let critical = biases.iter().filter(|b| b.severity == Severity::Critical).count();
    let high = biases.iter().filter(|b| b.severity == Severity::High).count();
    format!(
        "Decision quality score {:.0}/100 with {} bias(es) detected ({} critical, {} high).",
        overall_score,
        biases.len(),
        critical,
        high
    )
}
