//! Implementation of the `docaudit analyze` command.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use uuid::Uuid;

use crate::cli::output::progress::AnalysisProgress;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{AuditReport, Config, Severity};
use crate::services::{ReqwestConnector, StreamClient, StreamRetryPolicy};

/// Arguments for `docaudit analyze`.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Owning user id
    #[arg(long, short)]
    pub user: String,

    /// Document to analyze
    pub id: Uuid,

    /// Base URL of a running `docaudit serve`; defaults to the configured address
    #[arg(long)]
    pub server: Option<String>,
}

/// Result of a followed analysis run.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOutput {
    pub document_id: Uuid,
    pub reconnects: u32,
    pub report: AuditReport,
}

impl CommandOutput for AnalyzeOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let mut lines = vec![
            format!("Overall score: {:.0}", report.overall_score),
            format!("Noise score:   {:.0}", report.noise_score),
        ];
        for severity in Severity::ALL.iter().rev() {
            let n = report.count_by_severity(*severity);
            if n > 0 {
                lines.push(format!("{:<9} biases: {n}", severity.as_str()));
            }
        }
        if !report.summary.is_empty() {
            lines.push(String::new());
            lines.push(report.summary.clone());
        }
        lines.join("\n")
    }
}

/// Follow an analysis run on a server, reconnecting on transport failures.
pub async fn execute(args: AnalyzeArgs, config: &Config, json_mode: bool) -> Result<()> {
    let base_url = args
        .server
        .unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));
    let client = StreamClient::new(
        Arc::new(ReqwestConnector::new(base_url.as_str())),
        StreamRetryPolicy::from(&config.stream),
    );

    let progress = AnalysisProgress::new(!json_mode);
    let state = client.follow(&args.user, args.id, |update| progress.update(update)).await;

    let state = match state {
        Ok(state) => state,
        Err(e) => {
            progress.abandon(e.to_string());
            return Err(e).with_context(|| format!("Analysis of {} via {base_url} failed", args.id));
        }
    };

    let report = state
        .report()
        .cloned()
        .context("Stream finished without a report")?;
    output(
        &AnalyzeOutput {
            document_id: args.id,
            reconnects: state.reconnects,
            report,
        },
        json_mode,
    );
    Ok(())
}
