//! Application services: run orchestration, persistence, insights and the
//! progress stream client.

pub mod insights;
pub mod persistence;
pub mod pipeline_runner;
pub mod progress;
pub mod stream_client;

pub use insights::{aggregate, InsightsAccumulator, InsightsService};
pub use persistence::ResilientPersistence;
pub use pipeline_runner::{CompletedRun, PipelineError, PipelineRunner, RunnerConfig};
pub use progress::{stage_progress, ProgressSink, ProgressTracker};
pub use stream_client::{
    ClientRunState, ProgressFrameParser, ReqwestConnector, RunOutcome, StreamClient, StreamClientError,
    StreamConnector, StreamRetryPolicy,
};
