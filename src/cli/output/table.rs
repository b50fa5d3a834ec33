//! Table output formatting using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{Document, DocumentStatus, InsightsPayload, NamedCount};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    /// A formatter with colors on.
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    /// A formatter with colors set explicitly.
    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Table of documents with status and run count.
    pub fn format_documents(&self, documents: &[Document]) -> String {
        let mut table = base_table();
        table.set_header(header(&["ID", "Filename", "Status", "Runs", "Uploaded"]));

        for doc in documents {
            let status = Cell::new(doc.status.as_str());
            let status = if self.use_colors {
                status.fg(status_color(doc.status))
            } else {
                status
            };
            table.add_row(vec![
                Cell::new(doc.id),
                Cell::new(truncate(&doc.filename, 40)),
                status,
                Cell::new(doc.run_generation),
                Cell::new(doc.created_at.format("%Y-%m-%d %H:%M")),
            ]);
        }

        table.to_string()
    }

    /// One table for the headline numbers, then one per non-empty ranking.
    pub fn format_insights(&self, payload: &InsightsPayload) -> String {
        let mut sections = Vec::new();

        let mut overview = base_table();
        overview.set_header(header(&["Metric", "Value"]));
        let radar = &payload.radar;
        let rows: [(&str, String); 10] = [
            ("Documents", payload.total_documents.to_string()),
            ("Analyses", payload.total_analyses.to_string()),
            ("Quality", radar.quality.to_string()),
            ("Consistency", radar.consistency.to_string()),
            ("Fact accuracy", radar.fact_accuracy.to_string()),
            ("Logic", radar.logic.to_string()),
            ("Objectivity", radar.objectivity.to_string()),
            ("Compliance", radar.compliance.to_string()),
            ("Trend (first to last week)", format!("{:+}", payload.trend_delta)),
            (
                "Boardroom votes",
                format!(
                    "{} approve / {} reject / {} revise",
                    payload.boardroom_votes.approve, payload.boardroom_votes.reject, payload.boardroom_votes.revise
                ),
            ),
        ];
        for (metric, value) in rows {
            overview.add_row(vec![Cell::new(metric), Cell::new(value)]);
        }
        sections.push(overview.to_string());

        let mut distribution = base_table();
        distribution.set_header(header(&["Score range", "Analyses"]));
        for bucket in &payload.score_distribution {
            distribution.add_row(vec![Cell::new(&bucket.range), Cell::new(bucket.count)]);
        }
        sections.push(distribution.to_string());

        let rankings = [
            ("Bias type", &payload.bias_treemap),
            ("Severity", &payload.severity_histogram),
            ("Fallacy", &payload.top_fallacies),
            ("Failure scenario", &payload.top_failure_scenarios),
            ("Blind spot", &payload.top_blind_spots),
        ];
        for (label, counts) in rankings {
            if !counts.is_empty() {
                sections.push(counts_table(label, counts));
            }
        }

        if !payload.weekly_trend.is_empty() {
            let mut trend = base_table();
            trend.set_header(header(&["Week of", "Analyses", "Avg score", "Avg noise"]));
            for week in &payload.weekly_trend {
                trend.add_row(vec![
                    Cell::new(&week.week),
                    Cell::new(week.count),
                    Cell::new(week.avg_score),
                    Cell::new(week.avg_noise),
                ]);
            }
            sections.push(trend.to_string());
        }

        sections.join("\n\n")
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn counts_table(label: &str, counts: &[NamedCount]) -> String {
    let mut table = base_table();
    table.set_header(header(&[label, "Count"]));
    for entry in counts {
        table.add_row(vec![Cell::new(truncate(&entry.name, 60)), Cell::new(entry.count)]);
    }
    table.to_string()
}

fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(label).add_attribute(Attribute::Bold))
        .collect()
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn status_color(status: DocumentStatus) -> Color {
    match status {
        DocumentStatus::Pending => Color::DarkGrey,
        DocumentStatus::Analyzing => Color::Cyan,
        DocumentStatus::Complete => Color::Green,
        DocumentStatus::Error => Color::Red,
    }
}
