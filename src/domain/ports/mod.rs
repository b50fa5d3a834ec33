//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - StageGraph / AnalysisStage: the analysis execution engine
//! - DocumentRepository / AnalysisRepository: the document store
//! - EmbeddingStore: semantic retrieval side store

pub mod analysis_repository;
pub mod document_repository;
pub mod embedding_store;
pub mod stage_graph;

pub use analysis_repository::AnalysisRepository;
pub use document_repository::DocumentRepository;
pub use embedding_store::{EmbeddingStore, NullEmbeddingStore};
pub use stage_graph::{AnalysisStage, StageGraph};
