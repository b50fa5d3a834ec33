//! Docaudit - streaming document audits
//!
//! Runs a multi-stage analysis pipeline over uploaded documents, streams
//! progress to the client while it runs, persists the final report against
//! a schema that may lag behind the application, and aggregates a user's
//! reports into cross-document insights.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, ports and errors
//! - **Adapters** (`adapters`): SQLite storage, stage execution, HTTP surface
//! - **Service Layer** (`services`): pipeline runner, persistence, insights, stream client
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult, StoreError, StoreResult};
pub use domain::models::{AuditReport, Config, Document, InsightsPayload, InsightsResponse, ProgressUpdate};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{InsightsService, PipelineError, PipelineRunner, StreamClient};
