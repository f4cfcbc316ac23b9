use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Action;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    Stopping,
    Error,
}

/// Snapshot pushed to the status sink once per loop transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopStatus {
    pub state: LoopState,
    pub iteration: u64,
    pub reasoning: String,
    pub actions: Vec<Action>,
    /// Iterations per second measured over the previous iteration.
    pub fps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LoopStatus {
    pub fn new(state: LoopState, iteration: u64) -> Self {
        Self {
            state,
            iteration,
            reasoning: String::new(),
            actions: Vec::new(),
            fps: 0.0,
            error: None,
            clip_url: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    /// Attach an error, dropping any reasoning/actions so an observer never
    /// sees a failure next to intent that was not carried out.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(truncate_chars(&error.into(), MAX_ERROR_CHARS));
        self.reasoning.clear();
        self.actions.clear();
        self
    }
}

pub const MAX_ERROR_CHARS: usize = 300;

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
