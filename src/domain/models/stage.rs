//! Stage-graph vocabulary: stage identifiers, stage outputs, and the
//! aggregate state the graph builds up while running.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::{
    AuditReport, BiasFinding, CognitiveDiversity, Compliance, FactCheck, InstitutionalMemory,
    LogicalAnalysis, NoiseStats, PreMortem, Sentiment, Simulation, Swot,
};

/// The standard 11-stage audit pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardStage {
    Structurer,
    BiasDetective,
    NoiseJudge,
    FactChecker,
    PreMortem,
    ComplianceMapper,
    SentimentAnalyzer,
    LogicalAnalyzer,
    StrategicAnalyst,
    CognitiveDiversity,
    RiskScorer,
}

impl StandardStage {
    /// The standard stages in execution order.
    pub const ORDER: [Self; 11] = [
        Self::Structurer,
        Self::BiasDetective,
        Self::NoiseJudge,
        Self::FactChecker,
        Self::PreMortem,
        Self::ComplianceMapper,
        Self::SentimentAnalyzer,
        Self::LogicalAnalyzer,
        Self::StrategicAnalyst,
        Self::CognitiveDiversity,
        Self::RiskScorer,
    ];

    /// Node identifier.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Structurer => "structurer",
            Self::BiasDetective => "bias_detective",
            Self::NoiseJudge => "noise_judge",
            Self::FactChecker => "fact_checker",
            Self::PreMortem => "pre_mortem",
            Self::ComplianceMapper => "compliance_mapper",
            Self::SentimentAnalyzer => "sentiment_analyzer",
            Self::LogicalAnalyzer => "logical_analyzer",
            Self::StrategicAnalyst => "strategic_analyst",
            Self::CognitiveDiversity => "cognitive_diversity",
            Self::RiskScorer => "risk_scorer",
        }
    }

    /// User-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Structurer => "Parsing document structure",
            Self::BiasDetective => "Detecting cognitive biases",
            Self::NoiseJudge => "Measuring decision noise",
            Self::FactChecker => "Verifying claims",
            Self::PreMortem => "Running pre-mortem analysis",
            Self::ComplianceMapper => "Mapping regulatory compliance",
            Self::SentimentAnalyzer => "Analyzing sentiment",
            Self::LogicalAnalyzer => "Scanning for logical fallacies",
            Self::StrategicAnalyst => "Building SWOT analysis",
            Self::CognitiveDiversity => "Red-teaming the decision",
            Self::RiskScorer => "Computing final risk score",
        }
    }

    /// Look up a standard stage by node identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|s| s.id() == id)
    }
}

/// User-facing label for a stage identifier.
///
/// Unknown identifiers are title-cased (`red_team` -> `Red Team`).
pub fn stage_label(id: &str) -> String {
    if let Some(stage) = StandardStage::from_id(id) {
        return stage.label().to_string();
    }
    id.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structural outline produced by the structuring stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStructure {
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub key_claims: Vec<String>,
    #[serde(default)]
    pub word_count: usize,
}

/// Model-provided verdict from the risk-scoring stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One typed piece of output from a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", content = "data", rename_all = "snake_case")]
pub enum StageOutput {
    Structure(DocumentStructure),
    Biases(Vec<BiasFinding>),
    JudgeScores(Vec<f64>),
    Noise(NoiseStats),
    FactCheck(FactCheck),
    PreMortem(PreMortem),
    Compliance(Compliance),
    Sentiment(Sentiment),
    LogicalAnalysis(LogicalAnalysis),
    Swot(Swot),
    CognitiveDiversity(CognitiveDiversity),
    Simulation(Simulation),
    InstitutionalMemory(InstitutionalMemory),
    RiskAssessment(RiskAssessment),
    Report(AuditReport),
}

/// Input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInput {
    pub document_id: Uuid,
    pub user_id: String,
    pub content: String,
}

/// Aggregate state accumulated across stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphState {
    pub input: StageInput,
    pub structure: Option<DocumentStructure>,
    pub biases: Option<Vec<BiasFinding>>,
    pub judge_scores: Vec<f64>,
    pub noise: Option<NoiseStats>,
    pub fact_check: Option<FactCheck>,
    pub pre_mortem: Option<PreMortem>,
    pub compliance: Option<Compliance>,
    pub sentiment: Option<Sentiment>,
    pub logical_analysis: Option<LogicalAnalysis>,
    pub swot: Option<Swot>,
    pub cognitive_diversity: Option<CognitiveDiversity>,
    pub simulation: Option<Simulation>,
    pub institutional_memory: Option<InstitutionalMemory>,
    pub risk: Option<RiskAssessment>,
    pub final_report: Option<AuditReport>,
}

impl GraphState {
    /// Empty state for a run over `input`.
    pub fn new(input: StageInput) -> Self {
        Self {
            input,
            structure: None,
            biases: None,
            judge_scores: Vec::new(),
            noise: None,
            fact_check: None,
            pre_mortem: None,
            compliance: None,
            sentiment: None,
            logical_analysis: None,
            swot: None,
            cognitive_diversity: None,
            simulation: None,
            institutional_memory: None,
            risk: None,
            final_report: None,
        }
    }

    /// Merge one stage output into the state. Later outputs for the same
    /// section replace earlier ones; judge scores accumulate.
    pub fn apply(&mut self, output: StageOutput) {
        match output {
            StageOutput::Structure(v) => self.structure = Some(v),
            StageOutput::Biases(v) => self.biases = Some(v),
            StageOutput::JudgeScores(v) => self.judge_scores.extend(v),
            StageOutput::Noise(v) => self.noise = Some(v),
            StageOutput::FactCheck(v) => self.fact_check = Some(v),
            StageOutput::PreMortem(v) => self.pre_mortem = Some(v),
            StageOutput::Compliance(v) => self.compliance = Some(v),
            StageOutput::Sentiment(v) => self.sentiment = Some(v),
            StageOutput::LogicalAnalysis(v) => self.logical_analysis = Some(v),
            StageOutput::Swot(v) => self.swot = Some(v),
            StageOutput::CognitiveDiversity(v) => self.cognitive_diversity = Some(v),
            StageOutput::Simulation(v) => self.simulation = Some(v),
            StageOutput::InstitutionalMemory(v) => self.institutional_memory = Some(v),
            StageOutput::RiskAssessment(v) => self.risk = Some(v),
            StageOutput::Report(v) => self.final_report = Some(v),
        }
    }
}

/// Lifecycle events observed while a stage graph streams.
#[derive(Debug, Clone)]
pub enum StageEvent {
    Started { node: String },
    Finished { node: String, outputs: Vec<StageOutput> },
    Failed { node: String, error: String },
    Completed { state: Box<GraphState> },
}
