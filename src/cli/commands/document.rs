//! Implementation of the `docaudit document` commands.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use super::open_database;
use crate::adapters::sqlite::SqliteDocumentRepository;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{content_hash, Config, Document};
use crate::domain::ports::DocumentRepository;

/// Arguments for `docaudit document`.
#[derive(Args, Debug)]
pub struct DocumentArgs {
    #[command(subcommand)]
    pub command: DocumentCommands,
}

/// Document subcommands.
#[derive(Subcommand, Debug)]
pub enum DocumentCommands {
    /// Upload a text file for a user
    Add {
        /// Owning user id
        #[arg(long, short)]
        user: String,

        /// File to upload
        file: PathBuf,
    },

    /// List a user's documents
    List {
        #[arg(long, short)]
        user: String,
    },

    /// Delete a document together with its analyses
    Delete {
        #[arg(long, short)]
        user: String,

        id: Uuid,
    },
}

/// Result of `document add`.
#[derive(Debug, serde::Serialize)]
pub struct DocumentAddOutput {
    pub created: bool,
    pub document: Document,
}

impl CommandOutput for DocumentAddOutput {
    fn to_human(&self) -> String {
        if self.created {
            format!("Uploaded {} as {}", self.document.filename, self.document.id)
        } else {
            format!(
                "Identical content already uploaded as {} ({})",
                self.document.id, self.document.filename
            )
        }
    }
}

/// Result of `document list`.
#[derive(Debug, serde::Serialize)]
pub struct DocumentListOutput {
    pub documents: Vec<Document>,
}

impl CommandOutput for DocumentListOutput {
    fn to_human(&self) -> String {
        if self.documents.is_empty() {
            "No documents.".to_string()
        } else {
            TableFormatter::new().format_documents(&self.documents)
        }
    }
}

/// Result of `document delete`.
#[derive(Debug, serde::Serialize)]
pub struct DocumentDeleteOutput {
    pub id: Uuid,
    pub deleted: bool,
}

impl CommandOutput for DocumentDeleteOutput {
    fn to_human(&self) -> String {
        format!("Deleted document {}", self.id)
    }
}

/// Run a document subcommand against the local database.
pub async fn execute(args: DocumentArgs, config: &Config, json_mode: bool) -> Result<()> {
    let pool = open_database(config).await?;
    let repo = SqliteDocumentRepository::new(pool.clone());

    let result = match args.command {
        DocumentCommands::Add { user, file } => add(&repo, &user, file, json_mode).await,
        DocumentCommands::List { user } => {
            let documents = repo.list_for_owner(&user).await.context("Failed to list documents")?;
            output(&DocumentListOutput { documents }, json_mode);
            Ok(())
        }
        DocumentCommands::Delete { user, id } => {
            if !repo.delete(id, &user).await.context("Failed to delete document")? {
                bail!("Document {id} not found");
            }
            output(&DocumentDeleteOutput { id, deleted: true }, json_mode);
            Ok(())
        }
    };

    pool.close().await;
    result
}

async fn add(repo: &SqliteDocumentRepository, user: &str, file: PathBuf, json_mode: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if content.trim().is_empty() {
        bail!("{} is empty", file.display());
    }

    if let Some(existing) = repo.find_by_hash(user, &content_hash(&content)).await? {
        output(
            &DocumentAddOutput {
                created: false,
                document: existing,
            },
            json_mode,
        );
        return Ok(());
    }

    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let document = Document::new(user, filename, content);
    repo.create(&document).await.context("Failed to store document")?;

    output(
        &DocumentAddOutput {
            created: true,
            document,
        },
        json_mode,
    );
    Ok(())
}
