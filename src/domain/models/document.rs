//! Document domain model.
//!
//! A document is the immutable input unit of an audit. Only its lifecycle
//! status changes after upload, and only the pipeline runner changes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Uploaded, never analyzed
    #[default]
    Pending,
    /// A pipeline run is in flight
    Analyzing,
    /// The latest run committed an analysis
    Complete,
    /// The latest run failed
    Error,
}

impl DocumentStatus {
    /// Stored form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Parse a stored status, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "analyzing" => Some(Self::Analyzing),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// An uploaded document owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub owner_id: String,
    pub filename: String,
    #[serde(skip_serializing, default)]
    pub content: String,
    pub content_hash: String,
    pub status: DocumentStatus,
    /// Incremented every time a pipeline run starts.
    pub run_generation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A pending document with its content hash computed.
    pub fn new(owner_id: impl Into<String>, filename: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            filename: filename.into(),
            content_hash: content_hash(&content),
            content,
            status: DocumentStatus::Pending,
            run_generation: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` owns this document.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

/// Hex SHA-256 of the document text, used for per-owner deduplication.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_is_pending_with_hash() {
        let doc = Document::new("user-1", "memo.txt", "We should acquire the company.");
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.run_generation, 0);
        assert_eq!(doc.content_hash.len(), 64);
        assert_eq!(doc.content_hash, content_hash("We should acquire the company."));
        assert!(doc.is_owned_by("user-1"));
        assert!(!doc.is_owned_by("user-2"));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Analyzing,
            DocumentStatus::Complete,
            DocumentStatus::Error,
        ] {
            assert_eq!(DocumentStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_content_is_not_serialized() {
        let doc = Document::new("u", "a.txt", "secret body");
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["ownerId"], "u");
    }
}
