//! Progress narration for one pipeline run.
//!
//! Progress is banded: 0-10 initializing, 10-90 spread across the stages
//! as `round(completed / total * 80) + 10`, 90-100 persistence and
//! finalization. The tracker clamps every emission so the sequence a
//! client sees never decreases.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::domain::models::{stage_label, AuditReport, BiasFinding, NoiseResult, ProgressUpdate, StepStatus};

/// Progress of the initializing step.
pub const INITIALIZING_PROGRESS: u8 = 5;
/// Progress of the persistence step.
pub const PERSISTING_PROGRESS: u8 = 90;
/// Progress of the terminal `complete` event.
pub const COMPLETE_PROGRESS: u8 = 100;

/// Label of the initializing step.
pub const INITIALIZING_LABEL: &str = "Initializing analysis";
/// Label of the persistence step.
pub const PERSISTING_LABEL: &str = "Saving results";

/// Percent reached after `completed` of `total` stages.
pub fn stage_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return PERSISTING_PROGRESS;
    }
    let completed = completed.min(total);
    let band = (completed as f64 / total as f64 * 80.0).round() as u8;
    band + 10
}

/// Turns run milestones into non-decreasing progress events.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_stages: usize,
    completed_stages: usize,
    last: u8,
}

impl ProgressTracker {
    /// A tracker for a graph of `total_stages` stages.
    pub fn new(total_stages: usize) -> Self {
        Self {
            total_stages,
            completed_stages: 0,
            last: 0,
        }
    }

    /// Last progress value handed out.
    pub fn last(&self) -> u8 {
        self.last
    }

    /// Stages finished so far.
    pub fn completed_stages(&self) -> usize {
        self.completed_stages
    }

    fn advance(&mut self, progress: u8) -> u8 {
        self.last = progress.clamp(self.last, COMPLETE_PROGRESS);
        self.last
    }

    fn step(&mut self, label: String, status: StepStatus, progress: u8) -> ProgressUpdate {
        ProgressUpdate::Step {
            step: label,
            status,
            progress: self.advance(progress),
        }
    }

    /// The initializing step event.
    pub fn initializing(&mut self) -> ProgressUpdate {
        self.step(INITIALIZING_LABEL.to_string(), StepStatus::Running, INITIALIZING_PROGRESS)
    }

    /// Step event for a stage that just started.
    pub fn stage_started(&mut self, node: &str) -> ProgressUpdate {
        let progress = stage_progress(self.completed_stages, self.total_stages);
        self.step(stage_label(node), StepStatus::Running, progress)
    }

    /// Step event for a stage that just finished.
    pub fn stage_finished(&mut self, node: &str) -> ProgressUpdate {
        self.completed_stages += 1;
        let progress = stage_progress(self.completed_stages, self.total_stages);
        self.step(stage_label(node), StepStatus::Complete, progress)
    }

    /// Side-channel event for a detected bias.
    pub fn bias(&mut self, finding: &BiasFinding) -> ProgressUpdate {
        ProgressUpdate::Bias {
            bias_type: finding.bias_type.clone(),
            severity: finding.severity,
            progress: self.advance(self.last),
        }
    }

    /// Side-channel event for the judge panel's mean.
    pub fn noise(&mut self, mean: f64) -> ProgressUpdate {
        ProgressUpdate::Noise {
            result: NoiseResult { score: mean },
            progress: self.advance(self.last),
        }
    }

    /// The persistence step event.
    pub fn persisting(&mut self) -> ProgressUpdate {
        self.step(PERSISTING_LABEL.to_string(), StepStatus::Running, PERSISTING_PROGRESS)
    }

    /// The terminal `complete` event.
    pub fn complete(&mut self, report: AuditReport) -> ProgressUpdate {
        ProgressUpdate::Complete {
            result: Box::new(report),
            progress: self.advance(COMPLETE_PROGRESS),
        }
    }

    /// Terminal failure; carries the last progress reached.
    pub fn error(&mut self, message: impl Into<String>) -> ProgressUpdate {
        ProgressUpdate::Error {
            message: message.into(),
            progress: self.last,
        }
    }
}

/// Outbound side of a progress stream.
///
/// Every send is bounded by the run's overall deadline, so a client that
/// stops reading cannot stall stage execution past it. Once the client is
/// gone (or the deadline has been hit) further sends are dropped and the
/// run carries on.
#[derive(Debug)]
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressUpdate>,
    deadline: Instant,
    connected: bool,
    sent: usize,
}

impl ProgressSink {
    /// A sink whose sends give up at `deadline`.
    pub fn new(tx: mpsc::Sender<ProgressUpdate>, deadline: Instant) -> Self {
        Self {
            tx,
            deadline,
            connected: true,
            sent: 0,
        }
    }

    /// Sink whose deadline is `budget` from now.
    pub fn with_budget(tx: mpsc::Sender<ProgressUpdate>, budget: Duration) -> Self {
        Self::new(tx, Instant::now() + budget)
    }

    /// Whether the receiver is still listening.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Events delivered to the transport so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Deliver `update` unless the client is gone or the deadline passed.
    pub async fn send(&mut self, update: ProgressUpdate) {
        if !self.connected {
            return;
        }

        let kind = update.kind();
        let progress = update.progress();
        match tokio::time::timeout_at(self.deadline, self.tx.send(update)).await {
            Ok(Ok(())) => {
                self.sent += 1;
                tracing::trace!(kind, progress, "progress event sent");
            }
            Ok(Err(_)) => {
                self.connected = false;
                tracing::debug!(kind, progress, "client disconnected, run continues without a listener");
            }
            Err(_) => {
                self.connected = false;
                tracing::warn!(kind, progress, "client stopped reading until the run deadline, dropping further events");
            }
        }
    }
}
