//! Progress event protocol.
//!
//! One streaming session is a totally ordered sequence of `ProgressUpdate`
//! values. `progress` never decreases, and the session ends with exactly
//! one terminal event (`complete` or `error`).

use serde::{Deserialize, Serialize};

use super::report::{AuditReport, Severity};

/// Lifecycle of a step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Complete,
}

/// Intermediate noise result carried by a `noise` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseResult {
    pub score: f64,
}

/// A single streamed message describing pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ProgressUpdate {
    Step {
        step: String,
        status: StepStatus,
        progress: u8,
    },
    Bias {
        bias_type: String,
        severity: Severity,
        progress: u8,
    },
    Noise {
        result: NoiseResult,
        progress: u8,
    },
    Error {
        message: String,
        progress: u8,
    },
    Complete {
        result: Box<AuditReport>,
        progress: u8,
    },
}

impl ProgressUpdate {
    /// Percent carried by the event.
    pub fn progress(&self) -> u8 {
        match self {
            Self::Step { progress, .. }
            | Self::Bias { progress, .. }
            | Self::Noise { progress, .. }
            | Self::Error { progress, .. }
            | Self::Complete { progress, .. } => *progress,
        }
    }

    /// Whether the event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Complete { .. })
    }

    /// The `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Step { .. } => "step",
            Self::Bias { .. } => "bias",
            Self::Noise { .. } => "noise",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }

    /// Render the event as one `data:` frame terminated by a blank line.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
