//! Cross-document insights payload.
//!
//! Derived on every request from the set of a user's analyses; never
//! persisted. All percentage-like values are integers here because rounding
//! happens only at this presentation boundary.

use serde::{Deserialize, Serialize};

/// Six 0-100 quality axes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarAxes {
    pub quality: i64,
    pub consistency: i64,
    pub fact_accuracy: i64,
    pub logic: i64,
    pub objectivity: i64,
    pub compliance: i64,
}

/// One ten-point score bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBucket {
    pub range: String,
    pub count: u64,
}

/// A label with its frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

/// Fact-check verdict counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactFunnel {
    pub total_claims: u64,
    pub verified: u64,
    pub contradicted: u64,
    pub other: u64,
}

/// Pass/warn/fail tally for one regulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRow {
    pub regulation: String,
    pub pass: u64,
    pub warn: u64,
    pub fail: u64,
}

/// Most frequent items per SWOT quadrant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwotSummary {
    pub strengths: Vec<NamedCount>,
    pub weaknesses: Vec<NamedCount>,
    pub opportunities: Vec<NamedCount>,
    pub threats: Vec<NamedCount>,
}

/// Averages for one Sunday-aligned week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPoint {
    /// Sunday that starts the week, `YYYY-MM-DD`.
    pub week: String,
    pub avg_score: i64,
    pub avg_noise: i64,
    pub count: u64,
}

/// Boardroom simulation votes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub approve: u64,
    pub reject: u64,
    pub revise: u64,
}

/// Every rollup over a user's analyses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsPayload {
    pub total_documents: u64,
    pub total_analyses: u64,
    pub radar: RadarAxes,
    pub score_distribution: Vec<ScoreBucket>,
    pub bias_treemap: Vec<NamedCount>,
    pub severity_histogram: Vec<NamedCount>,
    pub fact_funnel: FactFunnel,
    pub compliance_grid: Vec<ComplianceRow>,
    pub swot: SwotSummary,
    pub weekly_trend: Vec<WeekPoint>,
    pub trend_delta: i64,
    pub top_fallacies: Vec<NamedCount>,
    pub top_failure_scenarios: Vec<NamedCount>,
    pub top_blind_spots: Vec<NamedCount>,
    pub boardroom_votes: VoteTally,
}

/// Marker body returned for a user with no documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyInsights {
    pub empty: bool,
}

/// Insights, or the empty marker for a user without documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InsightsResponse {
    Empty(EmptyInsights),
    Ready(Box<InsightsPayload>),
}

impl InsightsResponse {
    /// The `{"empty": true}` marker.
    pub fn empty() -> Self {
        Self::Empty(EmptyInsights { empty: true })
    }

    /// Whether this is the empty marker.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }
}
