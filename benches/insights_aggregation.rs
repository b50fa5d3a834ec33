//! Throughput of insights aggregation over growing histories.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use docaudit::domain::models::{
    AnalysisRecord, BiasInstance, ExtendedSections, FactCheck, FactVerification, InsightsConfig, Severity, Swot,
};
use docaudit::services::aggregate;

const SEVERITIES: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

fn record(i: usize, now: chrono::DateTime<Utc>) -> AnalysisRecord {
    let id = Uuid::new_v4();
    let verdicts = ["VERIFIED", "CONTRADICTED", "UNVERIFIABLE"];
    AnalysisRecord {
        id,
        document_id: Uuid::new_v4(),
        overall_score: (i * 37 % 101) as f64,
        noise_score: (i * 13 % 40) as f64,
        summary: format!("analysis {i}"),
        sections: ExtendedSections {
            fact_check: Some(FactCheck {
                score: 70.0,
                verifications: (0..4)
                    .map(|j| FactVerification {
                        claim: format!("claim {j}"),
                        verdict: verdicts[(i + j) % verdicts.len()].to_string(),
                        explanation: None,
                    })
                    .collect(),
            }),
            swot: Some(Swot {
                strengths: vec!["Strong brand".into(), format!("Asset {}", i % 7)],
                weaknesses: vec!["Thin margins".into()],
                opportunities: vec![format!("Market {}", i % 5)],
                threats: vec!["Regulation".into()],
            }),
            ..Default::default()
        },
        biases: (0..3)
            .map(|j| BiasInstance {
                id: Uuid::new_v4(),
                analysis_id: id,
                bias_type: format!("bias_{}", (i + j) % 9),
                severity: SEVERITIES[(i + j) % SEVERITIES.len()],
                excerpt: String::new(),
                explanation: String::new(),
                suggestion: String::new(),
                confidence: 0.8,
            })
            .collect(),
        created_at: now - Duration::hours((i * 7) as i64),
    }
}

fn bench_aggregate(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2026, 3, 18, 12, 0, 0).single().unwrap_or_else(Utc::now);
    let config = InsightsConfig::default();
    let type_counts: Vec<(String, u64)> = (0..9).map(|i| (format!("bias_{i}"), 10 + i)).collect();
    let severity_counts: Vec<(Severity, u64)> = SEVERITIES.iter().map(|s| (*s, 25)).collect();

    let mut group = c.benchmark_group("insights_aggregate");
    for size in [10usize, 100, 1_000, 10_000] {
        let records: Vec<AnalysisRecord> = (0..size).map(|i| record(i, now)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| {
                aggregate(
                    black_box(records),
                    size as u64,
                    &type_counts,
                    &severity_counts,
                    now,
                    &config,
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate);
criterion_main!(benches);
