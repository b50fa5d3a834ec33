//! Remote analysis stage.
//!
//! The stage worker owns prompts and models. It exposes one endpoint per
//! stage, `POST {base_url}/stages/{id}`, taking the accumulated graph state
//! as JSON and answering with the list of typed outputs the stage produced.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GraphState, StageOutput};
use crate::domain::ports::AnalysisStage;

/// A stage executed by the remote stage worker.
#[derive(Debug, Clone)]
pub struct HttpStage {
    id: String,
    endpoint: String,
    client: ReqwestClient,
}

impl HttpStage {
    /// Create a stage posting to `{base_url}/stages/{id}`.
    pub fn new(id: impl Into<String>, base_url: &str, client: ReqwestClient) -> Self {
        let id = id.into();
        let endpoint = format!("{}/stages/{}", base_url.trim_end_matches('/'), id);
        Self { id, endpoint, client }
    }

    /// URL this stage posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Shared HTTP client for every remote stage of one graph.
pub fn stage_client(request_timeout: Duration) -> DomainResult<ReqwestClient> {
    ReqwestClient::builder()
        .timeout(request_timeout)
        .build()
        .map_err(|e| DomainError::ExecutionFailed(format!("failed to build stage HTTP client: {e}")))
}

#[async_trait]
impl AnalysisStage for HttpStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, state: &GraphState) -> DomainResult<Vec<StageOutput>> {
        tracing::debug!(stage = %self.id, document_id = %state.input.document_id, "calling stage worker");

        let response = self
            .client
            .post(&self.endpoint)
            .json(state)
            .send()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("stage {} request failed: {e}", self.id)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::ExecutionFailed(format!(
                "stage {} returned {}: {}",
                self.id,
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<Vec<StageOutput>>()
            .await
            .map_err(|e| DomainError::SerializationError(format!("stage {} returned malformed output: {e}", self.id)))
    }
}
