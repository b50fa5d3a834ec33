//! Pipeline runs driven through the runner and over a real socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_test::assert_ok;

use common::{app_state, assert_well_formed, finding, scenario_graph, setup_test_logging};
use docaudit::adapters::http::build_router;
use docaudit::adapters::sqlite::{create_migrated_test_pool, SqliteAnalysisRepository, SqliteDocumentRepository};
use docaudit::adapters::stages::{RiskScorerStage, ScriptedStage, SequentialStageGraph};
use docaudit::domain::models::{Document, DocumentStatus, ProgressUpdate, Severity, StageOutput};
use docaudit::domain::ports::{AnalysisRepository, DocumentRepository, NullEmbeddingStore, StageGraph};
use docaudit::services::{
    PipelineError, PipelineRunner, ReqwestConnector, ResilientPersistence, RunOutcome, RunnerConfig, StreamClient,
    StreamClientError, StreamRetryPolicy,
};
use sqlx::SqlitePool;

fn runner_config() -> RunnerConfig {
    RunnerConfig {
        overall_timeout: Duration::from_secs(10),
        fallback_timeout: Duration::from_secs(5),
    }
}

fn runner(pool: &SqlitePool, graph: Arc<dyn StageGraph>) -> Arc<PipelineRunner> {
    let analyses = Arc::new(SqliteAnalysisRepository::new(pool.clone(), Duration::from_secs(300)));
    let persistence = Arc::new(ResilientPersistence::new(analyses, Arc::new(NullEmbeddingStore)));
    Arc::new(PipelineRunner::new(
        graph,
        Arc::new(SqliteDocumentRepository::new(pool.clone())),
        persistence,
        runner_config(),
    ))
}

/// A short graph whose first stage sleeps for `delay`.
fn slow_graph(delay: Duration) -> Arc<dyn StageGraph> {
    Arc::new(
        SequentialStageGraph::new(vec![
            Arc::new(ScriptedStage::new("structurer", vec![]).with_delay(delay)),
            Arc::new(ScriptedStage::new(
                "bias_detective",
                vec![StageOutput::Biases(vec![finding("anchoring", Severity::Medium)])],
            )),
            Arc::new(RiskScorerStage::new(None)),
        ])
        .unwrap(),
    )
}

fn failing_graph() -> Arc<dyn StageGraph> {
    Arc::new(SequentialStageGraph::new(vec![Arc::new(ScriptedStage::failing("structurer", "model unavailable"))]).unwrap())
}

async fn seed(pool: &SqlitePool) -> Document {
    let doc = Document::new("alice", "memo.txt", "We are certain the launch succeeds.");
    SqliteDocumentRepository::new(pool.clone()).create(&doc).await.unwrap();
    doc
}

async fn status(pool: &SqlitePool, doc: &Document) -> DocumentStatus {
    SqliteDocumentRepository::new(pool.clone())
        .get(doc.id)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn test_reference_scenario() {
    setup_test_logging();
    let pool = create_migrated_test_pool().await.unwrap();
    let doc = seed(&pool).await;

    let (mut rx, handle) = runner(&pool, scenario_graph()).spawn(doc.clone(), 8);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let run = assert_ok!(handle.await.unwrap());

    assert_well_formed(&events);
    let biases: Vec<Severity> = events
        .iter()
        .filter_map(|e| match e {
            ProgressUpdate::Bias { severity, .. } => Some(*severity),
            _ => None,
        })
        .collect();
    assert_eq!(biases, vec![Severity::High, Severity::Critical]);

    let noise = events.iter().find_map(|e| match e {
        ProgressUpdate::Noise { result, .. } => Some(result.score),
        _ => None,
    });
    assert_eq!(noise, Some(62.0));

    // Population std-dev of 60/62/64 is 1.63, doubled into the noise score.
    assert!((run.report.noise_score - 3.26).abs() < 1e-9);
    assert!((run.report.overall_score - (100.0 - 10.0 - 20.0 - 3.26 * 0.2)).abs() < 1e-9);
    assert_eq!(status(&pool, &doc).await, DocumentStatus::Complete);
}

#[tokio::test]
async fn test_run_outlives_a_disconnected_client() {
    let pool = create_migrated_test_pool().await.unwrap();
    let doc = seed(&pool).await;

    let (rx, handle) = runner(&pool, slow_graph(Duration::from_millis(50))).spawn(doc.clone(), 1);
    drop(rx);

    let run = assert_ok!(handle.await.unwrap());
    assert!(run.outcome.status_applied);
    assert_eq!(status(&pool, &doc).await, DocumentStatus::Complete);

    let analyses = SqliteAnalysisRepository::new(pool.clone(), Duration::from_secs(300));
    let latest = analyses.latest_for_document(doc.id).await.unwrap().unwrap();
    assert_eq!(latest.id, run.outcome.analysis_id);
}

#[tokio::test]
async fn test_latest_start_owns_status_when_older_run_finishes_last() {
    let pool = create_migrated_test_pool().await.unwrap();
    let doc = seed(&pool).await;

    let (mut slow_rx, slow) = runner(&pool, slow_graph(Duration::from_millis(400))).spawn(doc.clone(), 64);
    // Wait until the first run has claimed its generation.
    assert!(slow_rx.recv().await.is_some());

    let (_fast_rx, fast) = runner(&pool, slow_graph(Duration::ZERO)).spawn(doc.clone(), 64);
    let fast = assert_ok!(fast.await.unwrap());
    assert!(fast.outcome.status_applied);

    let slow = assert_ok!(slow.await.unwrap());
    assert!(slow.generation < fast.generation);
    assert!(!slow.outcome.status_applied);
    assert_eq!(status(&pool, &doc).await, DocumentStatus::Complete);

    let analyses = SqliteAnalysisRepository::new(pool.clone(), Duration::from_secs(300));
    assert_eq!(analyses.list_for_owner("alice").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_latest_run_is_not_overwritten_by_stale_success() {
    let pool = create_migrated_test_pool().await.unwrap();
    let doc = seed(&pool).await;

    let (mut slow_rx, slow) = runner(&pool, slow_graph(Duration::from_millis(400))).spawn(doc.clone(), 64);
    assert!(slow_rx.recv().await.is_some());

    let (_rx, failed) = runner(&pool, failing_graph()).spawn(doc.clone(), 64);
    let err = failed.await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Execution(ref m) if m.contains("model unavailable")));
    assert_eq!(status(&pool, &doc).await, DocumentStatus::Error);

    let slow = assert_ok!(slow.await.unwrap());
    assert!(!slow.outcome.status_applied);
    assert_eq!(status(&pool, &doc).await, DocumentStatus::Error);
}

#[tokio::test]
async fn test_stream_client_follows_a_live_server() {
    let pool = create_migrated_test_pool().await.unwrap();
    let doc = seed(&pool).await;
    let app = build_router(app_state(pool.clone(), scenario_graph()), false);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = StreamClient::new(
        Arc::new(ReqwestConnector::new(format!("http://{addr}"))),
        StreamRetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        },
    );

    let mut seen = Vec::new();
    let state = client
        .follow("alice", doc.id, |update| seen.push(update.progress()))
        .await
        .unwrap();

    assert_eq!(state.reconnects, 0);
    assert_eq!(state.last_progress, 100);
    assert_eq!(state.biases.len(), 2);
    assert_eq!(state.noise_score, Some(62.0));
    assert!(matches!(state.outcome, Some(RunOutcome::Complete(_))));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));

    // A foreign caller is rejected outright, without retries.
    let err = client.follow("mallory", doc.id, |_| {}).await.unwrap_err();
    assert!(matches!(err, StreamClientError::Server(ref m) if m.contains("404")));

    server.abort();
}

#[tokio::test]
async fn test_stream_client_gives_up_on_persistent_gateway_errors() {
    let mut server = mockito::Server::new_async().await;
    let unavailable = server
        .mock("POST", "/api/analyze/stream")
        .with_status(503)
        .with_body("upstream unavailable")
        .expect(3)
        .create_async()
        .await;

    let client = StreamClient::new(
        Arc::new(ReqwestConnector::new(server.url())),
        StreamRetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
    );

    let err = client.follow("alice", uuid::Uuid::new_v4(), |_| {}).await.unwrap_err();
    match err {
        StreamClientError::RetriesExhausted { attempts, last_error } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    unavailable.assert_async().await;
}

#[tokio::test]
async fn test_stream_client_reconnects_after_truncated_stream() {
    let mut server = mockito::Server::new_async().await;
    let truncated = server
        .mock("POST", "/api/analyze/stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"type\":\"step\",\"step\":\"Initializing analysis\",\"status\":\"running\",\"progress\":5}\n\n")
        .expect(2)
        .create_async()
        .await;

    let client = StreamClient::new(
        Arc::new(ReqwestConnector::new(server.url())),
        StreamRetryPolicy {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
    );

    let mut updates = 0;
    let err = client
        .follow("alice", uuid::Uuid::new_v4(), |_| updates += 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StreamClientError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(updates, 2);
    truncated.assert_async().await;
}

#[tokio::test]
async fn test_stream_client_does_not_retry_a_failed_run() {
    let mut server = mockito::Server::new_async().await;
    let failed = server
        .mock("POST", "/api/analyze/stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"type\":\"step\",\"step\":\"Initializing analysis\",\"status\":\"running\",\"progress\":5}\n\n",
            "data: {\"type\":\"error\",\"message\":\"Analysis timed out\",\"progress\":5}\n\n",
        ))
        .expect(1)
        .create_async()
        .await;

    let client = StreamClient::new(
        Arc::new(ReqwestConnector::new(server.url())),
        StreamRetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        },
    );

    let err = client.follow("alice", uuid::Uuid::new_v4(), |_| {}).await.unwrap_err();
    assert_eq!(err, StreamClientError::Server("Analysis timed out".to_string()));
    failed.assert_async().await;
}
