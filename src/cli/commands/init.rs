//! Implementation of the `docaudit init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use super::open_database;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

/// Arguments for `docaudit init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long, short)]
    pub force: bool,
}

/// Result of `docaudit init`.
#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub config_path: PathBuf,
    pub config_written: bool,
    pub database_path: String,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("Wrote default configuration to {}", self.config_path.display()));
        }
        lines.push(format!("Database ready at {}", self.database_path));
        lines.join("\n")
    }
}

/// Write the project config and create the database.
pub async fn execute(args: InitArgs, config: &Config, json_mode: bool) -> Result<()> {
    let config_path = PathBuf::from(crate::infrastructure::config::PROJECT_CONFIG_PATH);
    if let Some(dir) = config_path.parent() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let config_written = if args.force || !config_path.exists() {
        let yaml = serde_yaml::to_string(config).context("Failed to render configuration")?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    } else {
        false
    };

    let pool = open_database(config).await?;
    pool.close().await;

    output(
        &InitOutput {
            success: true,
            message: "Project initialized successfully.".to_string(),
            config_path,
            config_written,
            database_path: config.database.path.clone(),
        },
        json_mode,
    );
    Ok(())
}
