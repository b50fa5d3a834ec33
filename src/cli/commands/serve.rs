//! Implementation of the `docaudit serve` command.

use anyhow::{anyhow, Result};
use clap::Args;
use std::sync::Arc;

use super::open_database;
use crate::adapters::http::{AppState, AuditHttpServer};
use crate::adapters::stages::{standard_graph, UnavailableStageGraph};
use crate::domain::models::Config;
use crate::domain::ports::StageGraph;

/// Arguments for `docaudit serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the configured bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the configured port
    #[arg(long, short)]
    pub port: Option<u16>,
}

/// Run the HTTP server until Ctrl-C.
pub async fn execute(args: ServeArgs, config: &Config) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }

    let pool = open_database(config).await?;

    let graph: Arc<dyn StageGraph> = match standard_graph(&config.pipeline) {
        Ok(graph) => Arc::new(graph),
        Err(e) => {
            tracing::warn!(error = %e, "no stage worker configured, analysis runs will fail");
            Arc::new(UnavailableStageGraph::new(e.to_string()))
        }
    };

    let state = AppState::from_pool(pool.clone(), graph, config);
    AuditHttpServer::new(state, server_config)
        .serve_with_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow!("HTTP server failed: {e}"))?;

    pool.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
