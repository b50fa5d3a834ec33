//! Request handlers.
//!
//! Every failure that happens before a stream opens is a JSON
//! [`ErrorResponse`](super::error::ErrorResponse). Once the SSE response
//! has started, failures travel as `error` progress events instead.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::{api_error, internal, not_found, ApiError, UserId};
use super::state::{AppState, EVENT_BUFFER};
use crate::domain::models::{content_hash, AnalysisRecord, Document, InsightsResponse, ProgressUpdate};

/// Body of `POST /api/analyze/stream`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub document_id: Uuid,
}

/// Body of `POST /api/documents`.
#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub filename: String,
    pub content: String,
}

/// Response of `GET /api/documents/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub latest_analysis: Option<AnalysisRecord>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.body_text()))
}

/// Load a document the caller owns. A foreign document is reported exactly
/// like a missing one.
async fn owned_document(state: &AppState, id: Uuid, user_id: &str) -> Result<Document, ApiError> {
    state
        .documents
        .get(id)
        .await
        .map_err(internal)?
        .filter(|doc| doc.is_owned_by(user_id))
        .ok_or_else(not_found)
}

/// Run the pipeline for one document and stream its progress.
pub async fn analyze_stream(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = json_body(payload)?;
    let document = owned_document(&state, request.document_id, &user_id).await?;

    tracing::info!(document_id = %document.id, user_id = %user_id, "analysis stream opened");
    let (updates, _run) = state.runner.spawn(document, EVENT_BUFFER);

    Ok(Sse::new(progress_events(updates)).keep_alive(KeepAlive::new().interval(state.keep_alive)))
}

/// One SSE `data:` frame per progress update; ends when the run drops its
/// sender after the terminal event.
fn progress_events(updates: mpsc::Receiver<ProgressUpdate>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(updates, |mut rx| async move {
        let update = rx.recv().await?;
        let event = match Event::default().json_data(&update) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(kind = update.kind(), error = %e, "failed to encode progress event");
                Event::default().data(format!(
                    r#"{{"type":"error","message":"Failed to encode progress","progress":{}}}"#,
                    update.progress()
                ))
            }
        };
        Some((Ok(event), rx))
    })
}

/// Cross-document insights for the caller.
pub async fn get_insights(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<InsightsResponse>, ApiError> {
    state.insights.for_user(&user_id).await.map(Json).map_err(internal)
}

/// The caller's documents, newest first.
pub async fn list_documents(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Document>>, ApiError> {
    state.documents.list_for_owner(&user_id).await.map(Json).map_err(internal)
}

/// Upload a document. Identical content from the same owner returns the
/// existing document with 200 instead of creating a new one.
pub async fn create_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<CreateDocumentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let request = json_body(payload)?;
    if request.filename.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "filename is required"));
    }
    if request.content.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "content is empty"));
    }

    let hash = content_hash(&request.content);
    if let Some(existing) = state.documents.find_by_hash(&user_id, &hash).await.map_err(internal)? {
        tracing::debug!(document_id = %existing.id, "duplicate upload");
        return Ok((StatusCode::OK, Json(existing)));
    }

    let document = Document::new(user_id.as_str(), request.filename.trim(), request.content);
    match state.documents.create(&document).await {
        Ok(()) => {
            tracing::info!(document_id = %document.id, user_id = %user_id, "document created");
            Ok((StatusCode::CREATED, Json(document)))
        }
        // A concurrent upload of the same content won the unique index.
        Err(e) => match state.documents.find_by_hash(&user_id, &hash).await.map_err(internal)? {
            Some(existing) => Ok((StatusCode::OK, Json(existing))),
            None => Err(internal(e)),
        },
    }
}

/// A document plus its most recent analysis.
pub async fn get_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentDetail>, ApiError> {
    let document = owned_document(&state, id, &user_id).await?;
    let latest_analysis = state.analyses.latest_for_document(id).await.map_err(internal)?;
    Ok(Json(DocumentDetail {
        document,
        latest_analysis,
    }))
}

/// Delete an owned document and its analyses.
pub async fn delete_document(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.documents.delete(id, &user_id).await.map_err(internal)? {
        tracing::info!(document_id = %id, user_id = %user_id, "document deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

/// Liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "docaudit".to_string(),
    })
}
