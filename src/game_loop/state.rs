use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::LoopState;

/// Controller-side view of the loop, shared with the worker task.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopRuntime {
    pub state: LoopState,
    pub iteration: u64,
    /// Iterations per second over the last completed iteration.
    pub fps: f64,
    pub run_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl LoopRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, LoopState::Running | LoopState::Stopping)
    }

    pub fn begin(&mut self, run_id: String, started_at: DateTime<Utc>) {
        self.state = LoopState::Running;
        self.iteration = 0;
        self.fps = 0.0;
        self.run_id = Some(run_id);
        self.started_at = Some(started_at);
        self.last_error = None;
    }

    pub fn next_iteration(&mut self) -> u64 {
        self.iteration += 1;
        self.iteration
    }

    pub fn begin_stopping(&mut self) {
        self.state = LoopState::Stopping;
    }

    pub fn finish(&mut self) {
        self.state = LoopState::Idle;
    }

    /// Enter the terminal error state. Only a running loop can fail; a stop
    /// that is already under way wins.
    pub fn fail(&mut self, error: String) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Error;
        self.last_error = Some(error);
        true
    }
}
