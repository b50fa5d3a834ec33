//! Implementation of the `docaudit insights` command.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

use super::open_database;
use crate::adapters::sqlite::{SqliteAnalysisRepository, SqliteDocumentRepository};
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, InsightsResponse};
use crate::services::InsightsService;

/// Arguments for `docaudit insights`.
#[derive(Args, Debug)]
pub struct InsightsArgs {
    /// User whose analyses are aggregated
    #[arg(long, short)]
    pub user: String,
}

/// Insights rendered as tables or JSON.
#[derive(Debug, serde::Serialize)]
#[serde(transparent)]
pub struct InsightsOutput(pub InsightsResponse);

impl CommandOutput for InsightsOutput {
    fn to_human(&self) -> String {
        match &self.0 {
            InsightsResponse::Empty(_) => "No documents yet.".to_string(),
            InsightsResponse::Ready(payload) => TableFormatter::new().format_insights(payload),
        }
    }
}

/// Aggregate a user's analyses from the local database.
pub async fn execute(args: InsightsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let service = InsightsService::new(
        Arc::new(SqliteDocumentRepository::new(pool.clone())),
        Arc::new(SqliteAnalysisRepository::new(
            pool.clone(),
            Duration::from_secs(config.schema.reprobe_interval_secs),
        )),
        config.insights.clone(),
    );

    let response = service
        .for_user(&args.user)
        .await
        .context("Failed to aggregate insights")?;
    pool.close().await;

    output(&InsightsOutput(response), json_mode);
    Ok(())
}
