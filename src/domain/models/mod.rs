//! Domain models for the audit system.

pub mod analysis;
pub mod config;
pub mod document;
pub mod insights;
pub mod progress;
pub mod report;
pub mod stage;

pub use analysis::{AnalysisCommit, AnalysisRecord, BiasInstance, CommitOutcome, RecordShape};
pub use config::{
    Config, DatabaseConfig, InsightsConfig, LoggingConfig, PipelineConfig, SchemaConfig,
    ServerConfig, StreamRetryConfig,
};
pub use document::{content_hash, Document, DocumentStatus};
pub use insights::{
    ComplianceRow, EmptyInsights, FactFunnel, InsightsPayload, InsightsResponse, NamedCount,
    RadarAxes, ScoreBucket, SwotSummary, VoteTally, WeekPoint,
};
pub use progress::{NoiseResult, ProgressUpdate, StepStatus};
pub use report::{
    fallback_overall_score, AuditReport, BiasFinding, CognitiveDiversity, Compliance,
    ExtendedSections, FactCheck, FactVerification, Fallacy, InstitutionalMemory, LogicalAnalysis,
    NoiseStats, PastDecision, PreMortem, RegulationAssessment, ReportError, Sentiment, Severity,
    Simulation, Swot, TwinVote,
};
pub use stage::{
    stage_label, DocumentStructure, GraphState, RiskAssessment, StageEvent, StageInput,
    StageOutput, StandardStage,
};
