//! Cross-document insights.
//!
//! Every sub-aggregation is accumulated independently in one pass over the
//! user's analyses. Sums stay unrounded until `finish`; an empty
//! denominator yields 0.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AnalysisRecord, ComplianceRow, FactFunnel, InsightsConfig, InsightsPayload, InsightsResponse, NamedCount,
    RadarAxes, ScoreBucket, Severity, SwotSummary, VoteTally, WeekPoint,
};
use crate::domain::ports::{AnalysisRepository, DocumentRepository};

/// Dedup key length for failure scenarios.
const FAILURE_KEY_CHARS: usize = 100;
const BUCKETS: usize = 10;

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    fn add(&mut self, value: f64) {
        if value.is_finite() {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

fn round_pct(value: f64) -> i64 {
    value.round() as i64
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Frequency table that remembers first-seen order for stable ties.
#[derive(Debug, Default)]
struct Frequency {
    entries: HashMap<String, (String, u64, usize)>,
}

impl Frequency {
    fn add(&mut self, key: String, display: String) {
        if key.is_empty() {
            return;
        }
        let next = self.entries.len();
        self.entries.entry(key).or_insert((display, 0, next)).1 += 1;
    }

    /// Literal strings, whitespace-trimmed.
    fn add_literal(&mut self, text: &str) {
        let text = text.trim();
        self.add(text.to_string(), text.to_string());
    }

    /// Case- and whitespace-insensitive, optionally truncated.
    fn add_normalized(&mut self, text: &str, max_chars: Option<usize>) {
        let mut display = collapse_whitespace(text);
        if let Some(max) = max_chars {
            display = display.chars().take(max).collect();
        }
        self.add(display.to_lowercase(), display);
    }

    fn top(&self, n: usize) -> Vec<NamedCount> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        entries
            .into_iter()
            .take(n)
            .map(|(name, count, _)| NamedCount {
                name: name.clone(),
                count: *count,
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WeekAccumulator {
    score: Mean,
    noise: Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComplianceStatus {
    Pass,
    Warn,
    Fail,
}

fn classify_compliance(status: &str) -> Option<ComplianceStatus> {
    let status = status.trim().to_lowercase();
    if status.contains("fail") || status.starts_with("non") {
        Some(ComplianceStatus::Fail)
    } else if status.contains("warn") || status.contains("partial") {
        Some(ComplianceStatus::Warn)
    } else if status.contains("pass") || status == "compliant" || status == "ok" {
        Some(ComplianceStatus::Pass)
    } else {
        None
    }
}

/// Sunday that starts the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - ChronoDuration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// Label of the score bucket an overall score falls into; 100 joins 90-100.
pub fn bucket_index(score: f64) -> usize {
    if !score.is_finite() || score <= 0.0 {
        return 0;
    }
    ((score / 10.0).floor() as usize).min(BUCKETS - 1)
}

fn bucket_label(index: usize) -> String {
    let low = index * 10;
    if index == BUCKETS - 1 {
        format!("{low}-100")
    } else {
        format!("{low}-{}", low + 9)
    }
}

/// Single-pass accumulator over a user's analyses.
#[derive(Debug)]
pub struct InsightsAccumulator {
    window_start: DateTime<Utc>,
    top_n: usize,
    total: u64,
    quality: Mean,
    noise: Mean,
    fact_accuracy: Mean,
    logic: Mean,
    objectivity: Mean,
    compliance_score: Mean,
    buckets: [u64; BUCKETS],
    funnel: FactFunnel,
    compliance_grid: BTreeMap<String, ComplianceRow>,
    strengths: Frequency,
    weaknesses: Frequency,
    opportunities: Frequency,
    threats: Frequency,
    weeks: BTreeMap<NaiveDate, WeekAccumulator>,
    fallacies: Frequency,
    failure_scenarios: Frequency,
    blind_spots: Frequency,
    votes: VoteTally,
}

impl InsightsAccumulator {
    /// An empty accumulator; the trend window ends at `now`.
    pub fn new(config: &InsightsConfig, now: DateTime<Utc>) -> Self {
        Self {
            window_start: now - ChronoDuration::days(config.trend_window_days),
            top_n: config.top_n,
            total: 0,
            quality: Mean::default(),
            noise: Mean::default(),
            fact_accuracy: Mean::default(),
            logic: Mean::default(),
            objectivity: Mean::default(),
            compliance_score: Mean::default(),
            buckets: [0; BUCKETS],
            funnel: FactFunnel::default(),
            compliance_grid: BTreeMap::new(),
            strengths: Frequency::default(),
            weaknesses: Frequency::default(),
            opportunities: Frequency::default(),
            threats: Frequency::default(),
            weeks: BTreeMap::new(),
            fallacies: Frequency::default(),
            failure_scenarios: Frequency::default(),
            blind_spots: Frequency::default(),
            votes: VoteTally::default(),
        }
    }

    /// Fold one analysis into every rollup.
    pub fn add(&mut self, record: &AnalysisRecord) {
        self.total += 1;
        self.quality.add(record.overall_score);
        self.noise.add(record.noise_score);
        self.buckets[bucket_index(record.overall_score)] += 1;

        if record.created_at >= self.window_start {
            let week = self.weeks.entry(week_start(record.created_at.date_naive())).or_default();
            week.score.add(record.overall_score);
            week.noise.add(record.noise_score);
        }

        let s = &record.sections;

        if let Some(fc) = &s.fact_check {
            self.fact_accuracy.add(fc.score);
            for v in &fc.verifications {
                self.funnel.total_claims += 1;
                match v.verdict.trim().to_uppercase().as_str() {
                    "VERIFIED" => self.funnel.verified += 1,
                    "CONTRADICTED" => self.funnel.contradicted += 1,
                    _ => self.funnel.other += 1,
                }
            }
        }

        if let Some(la) = &s.logical_analysis {
            self.logic.add(la.score);
            for fallacy in &la.fallacies {
                self.fallacies.add_normalized(&fallacy.name, None);
            }
        }

        if let Some(sentiment) = &s.sentiment {
            self.objectivity.add(sentiment.objectivity());
        }

        if let Some(compliance) = &s.compliance {
            self.compliance_score.add(compliance.score);
            for regulation in &compliance.regulations {
                let Some(status) = classify_compliance(&regulation.status) else {
                    continue;
                };
                let name = regulation.name.trim();
                let row = self
                    .compliance_grid
                    .entry(name.to_string())
                    .or_insert_with(|| ComplianceRow {
                        regulation: name.to_string(),
                        ..Default::default()
                    });
                match status {
                    ComplianceStatus::Pass => row.pass += 1,
                    ComplianceStatus::Warn => row.warn += 1,
                    ComplianceStatus::Fail => row.fail += 1,
                }
            }
        }

        if let Some(swot) = &s.swot {
            swot.strengths.iter().for_each(|t| self.strengths.add_literal(t));
            swot.weaknesses.iter().for_each(|t| self.weaknesses.add_literal(t));
            swot.opportunities.iter().for_each(|t| self.opportunities.add_literal(t));
            swot.threats.iter().for_each(|t| self.threats.add_literal(t));
        }

        if let Some(pre_mortem) = &s.pre_mortem {
            for scenario in &pre_mortem.failure_scenarios {
                self.failure_scenarios.add_normalized(scenario, Some(FAILURE_KEY_CHARS));
            }
        }

        if let Some(diversity) = &s.cognitive_diversity {
            for spot in &diversity.blind_spots {
                self.blind_spots.add_normalized(spot, None);
            }
        }

        if let Some(simulation) = &s.simulation {
            for twin in &simulation.twins {
                match twin.vote.trim().to_uppercase().as_str() {
                    "APPROVE" => self.votes.approve += 1,
                    "REJECT" => self.votes.reject += 1,
                    "REVISE" => self.votes.revise += 1,
                    _ => {}
                }
            }
        }
    }

    /// Produce the payload, merging in the grouped bias counts.
    pub fn finish(
        self,
        total_documents: u64,
        type_counts: &[(String, u64)],
        severity_counts: &[(Severity, u64)],
    ) -> InsightsPayload {
        let consistency = if self.total == 0 {
            0.0
        } else {
            (100.0 - self.noise.value()).clamp(0.0, 100.0)
        };

        let radar = RadarAxes {
            quality: round_pct(self.quality.value()),
            consistency: round_pct(consistency),
            fact_accuracy: round_pct(self.fact_accuracy.value()),
            logic: round_pct(self.logic.value()),
            objectivity: round_pct(self.objectivity.value()),
            compliance: round_pct(self.compliance_score.value()),
        };

        let score_distribution = self
            .buckets
            .iter()
            .enumerate()
            .map(|(i, count)| ScoreBucket {
                range: bucket_label(i),
                count: *count,
            })
            .collect();

        let mut bias_treemap: Vec<NamedCount> = type_counts
            .iter()
            .map(|(name, count)| NamedCount {
                name: name.clone(),
                count: *count,
            })
            .collect();
        bias_treemap.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        let severity_histogram = Severity::ALL
            .iter()
            .map(|severity| NamedCount {
                name: severity.as_str().to_string(),
                count: severity_counts
                    .iter()
                    .filter(|(s, _)| s == severity)
                    .map(|(_, n)| *n)
                    .sum(),
            })
            .collect();

        let week_means: Vec<(NaiveDate, WeekAccumulator)> = self.weeks.into_iter().collect();
        let trend_delta = match (week_means.first(), week_means.last()) {
            (Some(first), Some(last)) if week_means.len() >= 2 => {
                round_pct(last.1.score.value() - first.1.score.value())
            }
            _ => 0,
        };
        let weekly_trend = week_means
            .iter()
            .map(|(week, acc)| WeekPoint {
                week: week.format("%Y-%m-%d").to_string(),
                avg_score: round_pct(acc.score.value()),
                avg_noise: round_pct(acc.noise.value()),
                count: acc.score.count,
            })
            .collect();

        InsightsPayload {
            total_documents,
            total_analyses: self.total,
            radar,
            score_distribution,
            bias_treemap,
            severity_histogram,
            fact_funnel: self.funnel,
            compliance_grid: self.compliance_grid.into_values().collect(),
            swot: SwotSummary {
                strengths: self.strengths.top(self.top_n),
                weaknesses: self.weaknesses.top(self.top_n),
                opportunities: self.opportunities.top(self.top_n),
                threats: self.threats.top(self.top_n),
            },
            weekly_trend,
            trend_delta,
            top_fallacies: self.fallacies.top(self.top_n),
            top_failure_scenarios: self.failure_scenarios.top(self.top_n),
            top_blind_spots: self.blind_spots.top(self.top_n),
            boardroom_votes: self.votes,
        }
    }
}

/// Aggregate a user's analyses into the insights payload.
pub fn aggregate(
    records: &[AnalysisRecord],
    total_documents: u64,
    type_counts: &[(String, u64)],
    severity_counts: &[(Severity, u64)],
    now: DateTime<Utc>,
    config: &InsightsConfig,
) -> InsightsPayload {
    let mut acc = InsightsAccumulator::new(config, now);
    for record in records {
        acc.add(record);
    }
    acc.finish(total_documents, type_counts, severity_counts)
}

/// Reads a user's history and aggregates it.
pub struct InsightsService {
    documents: Arc<dyn DocumentRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    config: InsightsConfig,
}

impl InsightsService {
    /// Create a service over the document and analysis stores.
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        config: InsightsConfig,
    ) -> Self {
        Self {
            documents,
            analyses,
            config,
        }
    }

    /// Insights for `user_id`, or the empty marker when they hold no documents.
    #[tracing::instrument(skip(self))]
    pub async fn for_user(&self, user_id: &str) -> DomainResult<InsightsResponse> {
        let total_documents = self.documents.count_for_owner(user_id).await?;
        if total_documents == 0 {
            return Ok(InsightsResponse::empty());
        }

        let records = self.analyses.list_for_owner(user_id).await?;

        // The grouped counts are independent sub-aggregations; losing one
        // must not take the rest of the payload down.
        let type_counts = self.analyses.bias_counts_by_type(user_id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "bias type counts unavailable");
            Vec::new()
        });
        let severity_counts = self.analyses.bias_counts_by_severity(user_id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "bias severity counts unavailable");
            Vec::new()
        });

        let payload = aggregate(
            &records,
            total_documents,
            &type_counts,
            &severity_counts,
            Utc::now(),
            &self.config,
        );
        tracing::debug!(analyses = payload.total_analyses, "insights aggregated");
        Ok(InsightsResponse::Ready(Box::new(payload)))
    }
}
