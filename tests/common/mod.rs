//! Common test utilities for integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use std::sync::Arc;

use docaudit::adapters::http::{AppState, USER_ID_HEADER};
use docaudit::adapters::stages::scripted_audit_graph;
use docaudit::domain::models::{BiasFinding, Config, ProgressUpdate, Severity};
use docaudit::domain::ports::StageGraph;

/// Setup test logging
///
/// Call this at the start of tests that need logging output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn finding(bias_type: &str, severity: Severity) -> BiasFinding {
    BiasFinding {
        bias_type: bias_type.to_string(),
        found: true,
        severity,
        excerpt: "we are certain this will work".to_string(),
        explanation: "Assumes the outcome".to_string(),
        suggestion: "List what would change the decision".to_string(),
        confidence: 0.9,
    }
}

/// One high and one critical bias, a judge panel answering 60, 62 and 64.
pub fn scenario_graph() -> Arc<dyn StageGraph> {
    Arc::new(
        scripted_audit_graph(
            vec![
                finding("confirmation", Severity::High),
                finding("overconfidence", Severity::Critical),
            ],
            vec![60.0, 62.0, 64.0],
        )
        .expect("scripted graph"),
    )
}

/// Defaults with short pipeline ceilings.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.pipeline.overall_timeout_secs = 10;
    config.pipeline.fallback_timeout_secs = 5;
    config.server.keep_alive_secs = 1;
    config
}

pub fn app_state(pool: SqlitePool, graph: Arc<dyn StageGraph>) -> AppState {
    AppState::from_pool(pool, graph, &test_config())
}

pub fn json_request(method: &str, uri: &str, user: Option<&str>, body: &serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub fn empty_request(method: &str, uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder.body(Body::empty()).expect("request")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Read an SSE body to the end and decode every `data:` frame. Keep-alive
/// comments carry no data and are skipped.
pub async fn sse_events(response: Response<Body>) -> Vec<ProgressUpdate> {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    text.split("\n\n")
        .filter_map(|frame| {
            let data: Vec<&str> = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
                .collect();
            if data.is_empty() {
                None
            } else {
                Some(serde_json::from_str(&data.join("\n")).expect("progress frame"))
            }
        })
        .collect()
}

/// Progress never decreases and exactly one terminal event closes the run.
pub fn assert_well_formed(events: &[ProgressUpdate]) {
    assert!(!events.is_empty());
    assert!(
        events.windows(2).all(|w| w[0].progress() <= w[1].progress()),
        "progress went backwards: {events:?}"
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().is_some_and(ProgressUpdate::is_terminal));
}
