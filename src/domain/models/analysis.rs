//! Persisted analysis records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::{AuditReport, BiasFinding, ExtendedSections, Severity};

/// A bias instance stored as a child of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasInstance {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub bias_type: String,
    pub severity: Severity,
    pub excerpt: String,
    pub explanation: String,
    pub suggestion: String,
    pub confidence: f64,
}

impl BiasInstance {
    /// Bias row for a finding of the given analysis.
    pub fn from_finding(analysis_id: Uuid, finding: &BiasFinding) -> Self {
        Self {
            id: Uuid::new_v4(),
            analysis_id,
            bias_type: finding.bias_type.clone(),
            severity: finding.severity,
            excerpt: finding.excerpt.clone(),
            explanation: finding.explanation.clone(),
            suggestion: finding.suggestion.clone(),
            confidence: finding.confidence,
        }
    }
}

/// Which column set a record was written or read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordShape {
    /// Core and extended fields
    Extended,
    /// Core fields only (schema lag)
    Core,
}

impl RecordShape {
    /// Label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extended => "extended",
            Self::Core => "core",
        }
    }
}

/// One stored audit result for a document.
///
/// Core fields are always present. `sections` is empty when the record was
/// written or read under schema lag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub overall_score: f64,
    pub noise_score: f64,
    pub summary: String,
    #[serde(flatten)]
    pub sections: ExtendedSections,
    #[serde(default)]
    pub biases: Vec<BiasInstance>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to commit one completed pipeline run.
#[derive(Debug, Clone)]
pub struct AnalysisCommit {
    pub analysis_id: Uuid,
    pub document_id: Uuid,
    /// Run generation that produced the report; the document status is only
    /// advanced if this is still the latest run.
    pub generation: i64,
    pub report: AuditReport,
    pub created_at: DateTime<Utc>,
}

impl AnalysisCommit {
    /// A commit of `report` for run `generation`, with a fresh analysis id.
    pub fn new(document_id: Uuid, generation: i64, report: AuditReport) -> Self {
        Self {
            analysis_id: Uuid::new_v4(),
            document_id,
            generation,
            report,
            created_at: Utc::now(),
        }
    }

    /// Bias rows for every found bias in the report.
    pub fn bias_instances(&self) -> Vec<BiasInstance> {
        self.report
            .biases
            .iter()
            .filter(|b| b.found)
            .map(|b| BiasInstance::from_finding(self.analysis_id, b))
            .collect()
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub analysis_id: Uuid,
    pub shape: RecordShape,
    /// False when a newer run owns the document status.
    pub status_applied: bool,
}
