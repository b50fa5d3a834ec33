//! CLI type definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{
    analyze::AnalyzeArgs, document::DocumentArgs, init::InitArgs, insights::InsightsArgs, serve::ServeArgs,
};

/// Command-line entry point.
#[derive(Parser)]
#[command(name = "docaudit")]
#[command(about = "Docaudit - streaming document audits and cross-document insights", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this YAML file instead of .docaudit/
    #[arg(short, long, global = true, env = "DOCAUDIT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create the project directory, default config and database
    Init(InitArgs),

    /// Run the HTTP server
    Serve(ServeArgs),

    /// Manage uploaded documents
    Document(DocumentArgs),

    /// Analyze a document through a running server, with live progress
    Analyze(AnalyzeArgs),

    /// Cross-document insights for a user
    Insights(InsightsArgs),
}
