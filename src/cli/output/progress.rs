//! Progress bar for a streamed analysis run.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::domain::models::ProgressUpdate;

const ANALYSIS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// A 0-100 bar driven by progress events.
pub struct AnalysisProgress {
    bar: ProgressBar,
}

impl AnalysisProgress {
    /// Create a bar; a hidden bar still tracks position.
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(ANALYSIS_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars(PROGRESS_CHARS),
        );
        if visible {
            bar.enable_steady_tick(Duration::from_millis(120));
        } else {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self { bar }
    }

    /// Advance to the event's progress and show its message.
    pub fn update(&self, update: &ProgressUpdate) {
        self.bar.set_position(u64::from(update.progress()));
        match update {
            ProgressUpdate::Step { step, .. } => self.bar.set_message(step.clone()),
            ProgressUpdate::Bias { bias_type, severity, .. } => {
                self.bar
                    .println(format!("  {} bias detected: {bias_type}", severity.as_str()));
            }
            ProgressUpdate::Noise { result, .. } => {
                self.bar.println(format!("  judge panel mean: {:.1}", result.score));
            }
            ProgressUpdate::Error { message, .. } => self.bar.abandon_with_message(message.clone()),
            ProgressUpdate::Complete { .. } => self.bar.finish_with_message("Analysis complete"),
        }
    }

    /// Current position, 0-100.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Stop the bar, leaving `message` on screen.
    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }
}
