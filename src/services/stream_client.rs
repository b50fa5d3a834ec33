//! Client side of the analysis progress stream.
//!
//! Reads `data:` frames, rebuilds run state as events arrive and reconnects
//! only when the connection drops without a terminal frame. An in-stream
//! `error` event is final.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{AuditReport, ProgressUpdate, Severity, StepStatus, StreamRetryConfig};

/// Raw response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamClientError>> + Send>>;

/// Failures seen while following a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamClientError {
    /// Connection failed or closed without a terminal frame
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("stream failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The server reported a terminal failure for this run
    #[error("server error: {0}")]
    Server(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StreamClientError {
    /// Whether a reconnect may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Opens one progress stream for a document.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, user_id: &str, document_id: Uuid) -> Result<ByteStream, StreamClientError>;
}

/// Connector for a running `docaudit serve`.
pub struct ReqwestConnector {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestConnector {
    /// Create a connector for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full URL of the stream endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/api/analyze/stream", self.base_url)
    }
}

#[async_trait]
impl StreamConnector for ReqwestConnector {
    async fn connect(&self, user_id: &str, document_id: Uuid) -> Result<ByteStream, StreamClientError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-user-id", user_id)
            .json(&serde_json::json!({ "documentId": document_id }))
            .send()
            .await
            .map_err(|e| StreamClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
            // Gateway hiccups are worth another attempt; a rejected request is not.
            return Err(if status.is_server_error() {
                StreamClientError::Transport(message)
            } else {
                StreamClientError::Server(message)
            });
        }

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| StreamClientError::Transport(e.to_string()))),
        ))
    }
}

/// Splits a byte stream into progress events.
///
/// Bytes are buffered undecoded until a blank line closes a frame, so a
/// chunk boundary inside a multi-byte character or a `\r\n` pair never
/// reaches the decoder.
pub struct ProgressFrameParser {
    inner: ByteStream,
    buffer: BytesMut,
}

/// Position of the first blank line in `buf`: the frame length including
/// its last line ending, and the number of bytes to consume.
fn frame_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    buf.iter().enumerate().find_map(|(i, byte)| {
        if *byte != b'\n' {
            return None;
        }
        match (buf.get(i + 1), buf.get(i + 2)) {
            (Some(b'\n'), _) => Some((i + 1, i + 2)),
            (Some(b'\r'), Some(b'\n')) => Some((i + 1, i + 3)),
            _ => None,
        }
    })
}

impl ProgressFrameParser {
    /// Parse frames out of `inner`.
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
        }
    }

    fn next_frame(&mut self) -> Option<Bytes> {
        let (frame_len, consumed) = frame_boundary(&self.buffer)?;
        let mut frame = self.buffer.split_to(consumed);
        frame.truncate(frame_len);
        Some(frame.freeze())
    }

    fn parse_frame(frame: &[u8]) -> Option<Result<ProgressUpdate, StreamClientError>> {
        let frame = match std::str::from_utf8(frame) {
            Ok(frame) => frame,
            Err(e) => return Some(Err(StreamClientError::Protocol(format!("progress frame is not UTF-8: {e}")))),
        };

        let data: String = frame
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|d| d.strip_prefix(' ').unwrap_or(d))
            .collect::<Vec<_>>()
            .join("\n");

        if data.trim().is_empty() {
            return None;
        }

        Some(
            serde_json::from_str::<ProgressUpdate>(&data)
                .map_err(|e| StreamClientError::Protocol(format!("malformed progress frame: {e}"))),
        )
    }
}

impl Stream for ProgressFrameParser {
    type Item = Result<ProgressUpdate, StreamClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.next_frame() {
                if let Some(event) = Self::parse_frame(&frame) {
                    return Poll::Ready(Some(event));
                }
                continue;
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    if !self.buffer.iter().all(u8::is_ascii_whitespace) {
                        tracing::debug!(pending = self.buffer.len(), "stream ended inside a frame");
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Terminal result of a run as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Complete(Box<AuditReport>),
    Failed(String),
}

/// What a client knows about a run from the events it has seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientRunState {
    pub last_progress: u8,
    pub current_step: Option<String>,
    pub completed_steps: Vec<String>,
    pub biases: Vec<(String, Severity)>,
    pub noise_score: Option<f64>,
    pub outcome: Option<RunOutcome>,
    /// Reconnections made before this state was reached
    pub reconnects: u32,
}

impl ClientRunState {
    /// Fold one event into the state.
    pub fn apply(&mut self, update: &ProgressUpdate) {
        self.last_progress = self.last_progress.max(update.progress());
        match update {
            ProgressUpdate::Step { step, status, .. } => match status {
                StepStatus::Running => self.current_step = Some(step.clone()),
                StepStatus::Complete => {
                    self.current_step = None;
                    self.completed_steps.push(step.clone());
                }
            },
            ProgressUpdate::Bias { bias_type, severity, .. } => self.biases.push((bias_type.clone(), *severity)),
            ProgressUpdate::Noise { result, .. } => self.noise_score = Some(result.score),
            ProgressUpdate::Error { message, .. } => self.outcome = Some(RunOutcome::Failed(message.clone())),
            ProgressUpdate::Complete { result, .. } => self.outcome = Some(RunOutcome::Complete(result.clone())),
        }
    }

    /// The final report, once the run completed.
    pub fn report(&self) -> Option<&AuditReport> {
        match &self.outcome {
            Some(RunOutcome::Complete(report)) => Some(report),
            _ => None,
        }
    }
}

/// Reconnection policy for transport failures.
#[derive(Debug, Clone)]
pub struct StreamRetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl StreamRetryPolicy {
    /// Delay before reconnection number `attempt` (zero-based):
    /// `initial * 2^attempt`, capped at `max_backoff`. Configuration
    /// validation keeps the cap above the last retry's delay, so loaded
    /// policies never plateau.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl From<&StreamRetryConfig> for StreamRetryPolicy {
    fn from(config: &StreamRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Follows analysis runs over a [`StreamConnector`].
pub struct StreamClient {
    connector: Arc<dyn StreamConnector>,
    policy: StreamRetryPolicy,
}

impl StreamClient {
    /// Create a client with the given connector and retry policy.
    pub fn new(connector: Arc<dyn StreamConnector>, policy: StreamRetryPolicy) -> Self {
        Self { connector, policy }
    }

    /// Follow a run until it reaches a terminal event.
    ///
    /// `on_update` sees every event in order. A reconnection requests a new
    /// run, so the state is rebuilt from scratch on each attempt.
    pub async fn follow<F>(
        &self,
        user_id: &str,
        document_id: Uuid,
        mut on_update: F,
    ) -> Result<ClientRunState, StreamClientError>
    where
        F: FnMut(&ProgressUpdate) + Send,
    {
        let mut reconnects = 0u32;
        loop {
            let mut state = ClientRunState {
                reconnects,
                ..Default::default()
            };

            let err = match self.attempt(user_id, document_id, &mut state, &mut on_update).await {
                Ok(()) => match &state.outcome {
                    Some(RunOutcome::Complete(_)) => return Ok(state),
                    Some(RunOutcome::Failed(message)) => return Err(StreamClientError::Server(message.clone())),
                    None => StreamClientError::Transport("stream closed without a terminal event".to_string()),
                },
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if reconnects >= self.policy.max_retries {
                tracing::warn!(%document_id, attempts = reconnects + 1, error = %err, "giving up on progress stream");
                return Err(StreamClientError::RetriesExhausted {
                    attempts: reconnects + 1,
                    last_error: err.to_string(),
                });
            }

            let delay = self.policy.backoff(reconnects);
            tracing::warn!(
                %document_id,
                attempt = reconnects + 1,
                delay_ms = delay.as_millis() as u64,
                last_progress = state.last_progress,
                error = %err,
                "progress stream dropped, reconnecting"
            );
            tokio::time::sleep(delay).await;
            reconnects += 1;
        }
    }

    async fn attempt<F>(
        &self,
        user_id: &str,
        document_id: Uuid,
        state: &mut ClientRunState,
        on_update: &mut F,
    ) -> Result<(), StreamClientError>
    where
        F: FnMut(&ProgressUpdate) + Send,
    {
        let bytes = self.connector.connect(user_id, document_id).await?;
        let mut events = ProgressFrameParser::new(bytes);

        while let Some(event) = events.next().await {
            let update = event?;
            state.apply(&update);
            on_update(&update);
            if update.is_terminal() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NoiseResult;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn frames(updates: &[ProgressUpdate]) -> Vec<Bytes> {
        updates
            .iter()
            .map(|u| Bytes::from(u.to_frame().unwrap()))
            .collect()
    }

    fn step(label: &str, status: StepStatus, progress: u8) -> ProgressUpdate {
        ProgressUpdate::Step {
            step: label.into(),
            status,
            progress,
        }
    }

    fn report() -> AuditReport {
        AuditReport {
            overall_score: 66.0,
            noise_score: 16.0,
            summary: "ok".into(),
            biases: vec![],
            sections: Default::default(),
        }
    }

    /// Serves the same canned chunks on every connection.
    struct CannedConnector {
        chunks: Vec<Bytes>,
        connects: AtomicU32,
    }

    impl CannedConnector {
        fn new(chunks: Vec<Bytes>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                connects: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl StreamConnector for CannedConnector {
        async fn connect(&self, _user_id: &str, _document_id: Uuid) -> Result<ByteStream, StreamClientError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let chunks: Vec<Result<Bytes, StreamClientError>> = self.chunks.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn policy(max_retries: u32) -> StreamRetryPolicy {
        StreamRetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = StreamRetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        let delays: Vec<u128> = (0..5).map(|a| p.backoff(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(p.backoff(64), Duration::from_millis(500));
    }

    #[test]
    fn test_default_policy_backoff_strictly_increases() {
        let p = StreamRetryPolicy::from(&StreamRetryConfig::default());
        let delays: Vec<Duration> = (0..p.max_retries).map(|a| p.backoff(a)).collect();
        assert_eq!(delays.len(), 3);
        assert!(delays.windows(2).all(|w| w[0] < w[1]), "{delays:?}");
    }

    #[tokio::test]
    async fn test_parser_handles_split_frames() {
        let frame = step("Parsing document structure", StepStatus::Running, 10).to_frame().unwrap();
        let (a, b) = frame.split_at(7);
        let chunks: Vec<Result<Bytes, StreamClientError>> = vec![
            Ok(Bytes::from(a.to_string())),
            Ok(Bytes::from(b.to_string())),
            Ok(Bytes::from(": keep-alive\n\n")),
        ];
        let mut parser = ProgressFrameParser::new(Box::pin(futures::stream::iter(chunks)));

        let first = parser.next().await.unwrap().unwrap();
        assert_eq!(first.progress(), 10);
        assert!(parser.next().await.is_none());
    }

    fn parse_chunks(chunks: Vec<Vec<u8>>) -> ProgressFrameParser {
        let chunks: Vec<Result<Bytes, StreamClientError>> = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        ProgressFrameParser::new(Box::pin(futures::stream::iter(chunks)))
    }

    #[tokio::test]
    async fn test_parser_keeps_characters_split_across_chunks() {
        let event = ProgressUpdate::Bias {
            bias_type: "Bestätigungsfehler".into(),
            severity: Severity::High,
            progress: 20,
        };
        let frame = event.to_frame().unwrap().into_bytes();
        // Cut between the two bytes of 'ä'.
        let cut = frame.windows(2).position(|w| w == &[0xC3u8, 0xA4][..]).unwrap() + 1;
        let mut parser = parse_chunks(vec![frame[..cut].to_vec(), frame[cut..].to_vec()]);

        assert_eq!(parser.next().await.unwrap().unwrap(), event);
        assert!(parser.next().await.is_none());
    }

    #[tokio::test]
    async fn test_parser_handles_crlf_split_across_chunks() {
        let first = step("Parsing document structure", StepStatus::Running, 10);
        let second = step("Parsing document structure", StepStatus::Complete, 17);
        let body = format!(
            "data: {}\r\n\r\ndata: {}\r\n\r\n",
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        )
        .into_bytes();
        // The first frame's closing blank line arrives as "\r" then "\n...".
        let blank = body.windows(4).position(|w| w == &b"\r\n\r\n"[..]).unwrap();
        let cut = blank + 3;
        let mut parser = parse_chunks(vec![body[..cut].to_vec(), body[cut..].to_vec()]);

        assert_eq!(parser.next().await.unwrap().unwrap(), first);
        assert_eq!(parser.next().await.unwrap().unwrap(), second);
        assert!(parser.next().await.is_none());
    }

    #[tokio::test]
    async fn test_parser_rejects_invalid_utf8() {
        let mut parser = parse_chunks(vec![b"data: {\"type\":\"\xFF\"}\n\n".to_vec()]);
        assert!(matches!(parser.next().await, Some(Err(StreamClientError::Protocol(_)))));
    }

    #[test]
    fn test_frame_boundary() {
        assert_eq!(frame_boundary(b"data: x\n\nrest"), Some((8, 9)));
        assert_eq!(frame_boundary(b"data: x\r\n\r\nrest"), Some((9, 11)));
        assert_eq!(frame_boundary(b"data: x\r\n\r"), None);
        assert_eq!(frame_boundary(b"data: x"), None);
    }

    #[tokio::test]
    async fn test_parser_rejects_garbage() {
        let chunks: Vec<Result<Bytes, StreamClientError>> = vec![Ok(Bytes::from("data: {not json}\n\n"))];
        let mut parser = ProgressFrameParser::new(Box::pin(futures::stream::iter(chunks)));
        assert!(matches!(parser.next().await, Some(Err(StreamClientError::Protocol(_)))));
    }

    #[tokio::test]
    async fn test_follow_rebuilds_state() {
        let connector = CannedConnector::new(frames(&[
            step("Initializing analysis", StepStatus::Running, 5),
            ProgressUpdate::Bias {
                bias_type: "anchoring".into(),
                severity: Severity::High,
                progress: 10,
            },
            ProgressUpdate::Noise {
                result: NoiseResult { score: 62.0 },
                progress: 10,
            },
            step("Detecting cognitive biases", StepStatus::Complete, 17),
            ProgressUpdate::Complete {
                result: Box::new(report()),
                progress: 100,
            },
        ]));
        let client = StreamClient::new(connector.clone(), policy(3));

        let mut seen = 0;
        let state = client.follow("alice", Uuid::new_v4(), |_| seen += 1).await.unwrap();

        assert_eq!(seen, 5);
        assert_eq!(state.last_progress, 100);
        assert_eq!(state.completed_steps, vec!["Detecting cognitive biases".to_string()]);
        assert_eq!(state.biases, vec![("anchoring".to_string(), Severity::High)]);
        assert_eq!(state.noise_score, Some(62.0));
        assert_eq!(state.report().map(|r| r.overall_score), Some(66.0));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_without_terminal_retries_with_backoff() {
        let connector = CannedConnector::new(frames(&[
            step("Initializing analysis", StepStatus::Running, 5),
            step("Parsing document structure", StepStatus::Running, 10),
        ]));
        let client = StreamClient::new(connector.clone(), policy(3));

        let started = tokio::time::Instant::now();
        let err = client.follow("alice", Uuid::new_v4(), |_| {}).await.unwrap_err();

        assert!(matches!(err, StreamClientError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms of backoff between the four attempts.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(700), "waited {waited:?}");
        assert!(waited < Duration::from_millis(800), "waited {waited:?}");
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let connector = CannedConnector::new(frames(&[
            step("Initializing analysis", StepStatus::Running, 5),
            ProgressUpdate::Error {
                message: "Analysis timed out".into(),
                progress: 5,
            },
        ]));
        let client = StreamClient::new(connector.clone(), policy(3));

        let err = client.follow("alice", Uuid::new_v4(), |_| {}).await.unwrap_err();
        assert_eq!(err, StreamClientError::Server("Analysis timed out".into()));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reqwest_connector_maps_statuses() {
        let mut server = mockito::Server::new_async().await;
        let not_found = server
            .mock("POST", "/api/analyze/stream")
            .match_header("x-user-id", "alice")
            .with_status(404)
            .with_body(r#"{"error":"Document not found","code":"NOT_FOUND"}"#)
            .create_async()
            .await;

        let connector = ReqwestConnector::new(server.url());
        let err = match connector.connect("alice", Uuid::new_v4()).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, StreamClientError::Server(ref m) if m.contains("404")));
        not_found.assert_async().await;
    }
}
