//! Cached knowledge of whether the deployed schema carries the extended
//! analysis columns.
//!
//! Writers and readers each own a gate. A gate that has seen a drift error
//! stops attempting the extended path until the reprobe interval elapses,
//! after which the next operation probes again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What a gate last learned about the extended columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing attempted yet
    Unknown,
    /// The last extended attempt succeeded
    Extended,
    /// The last extended attempt hit schema drift at `since`
    CoreOnly { since: Instant },
}

/// Per-side cache of the extended-column capability.
#[derive(Debug)]
pub struct SchemaGate {
    side: &'static str,
    reprobe_interval: Duration,
    state: Mutex<GateState>,
}

impl SchemaGate {
    /// Create an `Unknown` gate for `side` (`read` or `write`).
    pub fn new(side: &'static str, reprobe_interval: Duration) -> Self {
        Self {
            side,
            reprobe_interval,
            state: Mutex::new(GateState::Unknown),
        }
    }

    /// Label used in logs and metrics.
    pub fn side(&self) -> &'static str {
        self.side
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether the next operation should try the extended column set.
    pub fn should_try_extended(&self) -> bool {
        self.should_try_extended_at(Instant::now())
    }

    fn should_try_extended_at(&self, now: Instant) -> bool {
        match self.state() {
            GateState::Unknown | GateState::Extended => true,
            GateState::CoreOnly { since } => now.saturating_duration_since(since) >= self.reprobe_interval,
        }
    }

    /// The extended path just succeeded.
    pub fn record_extended(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if matches!(*state, GateState::CoreOnly { .. }) {
            tracing::info!(side = self.side, "extended analysis columns are available again");
        }
        *state = GateState::Extended;
    }

    /// The extended path just hit schema drift.
    pub fn record_core_only(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !matches!(*state, GateState::CoreOnly { .. }) {
            tracing::warn!(
                side = self.side,
                reprobe_secs = self.reprobe_interval.as_secs(),
                "schema lacks extended analysis columns, using core fields"
            );
        }
        *state = GateState::CoreOnly { since: Instant::now() };
    }
}
