//! Docaudit CLI entry point.

use anyhow::Result;
use clap::Parser;

use docaudit::cli::{commands, handle_error, Cli, Commands};
use docaudit::domain::models::Config;
use docaudit::infrastructure::config::ConfigLoader;
use docaudit::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config: Config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &config, cli.json).await,
        Commands::Serve(args) => commands::serve::execute(args, &config).await,
        Commands::Document(args) => commands::document::execute(args, &config, cli.json).await,
        Commands::Analyze(args) => commands::analyze::execute(args, &config, cli.json).await,
        Commands::Insights(args) => commands::insights::execute(args, &config, cli.json).await,
    }
}
