use async_trait::async_trait;

use super::InferenceError;
use crate::models::{Clip, InferenceResult};

/// Detail level the service samples video frames at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaResolution {
    Low,
    Medium,
}

impl MediaResolution {
    /// `low` maps to [`MediaResolution::Low`]; anything else to medium.
    pub fn from_config(value: &str) -> Self {
        if value == "low" {
            MediaResolution::Low
        } else {
            MediaResolution::Medium
        }
    }
}

/// Everything the service needs for one analysis call.
#[derive(Debug)]
pub struct ReasoningRequest<'a> {
    pub api_key: &'a str,
    pub model: &'a str,
    pub clip: &'a Clip,
    /// Frame rate the clip was recorded at.
    pub fps: u32,
    pub system_prompt: &'a str,
    pub prompt: String,
    pub temperature: f64,
    pub media_resolution: MediaResolution,
}

/// What came back. `parsed` is the service's structured output when it
/// produced one; `text` is the raw payload for the fallback parse.
#[derive(Debug, Clone, Default)]
pub struct ReasoningReply {
    pub parsed: Option<InferenceResult>,
    pub text: Option<String>,
}

impl ReasoningReply {
    pub fn parsed(result: InferenceResult) -> Self {
        Self {
            parsed: Some(result),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parsed: None,
            text: Some(text.into()),
        }
    }
}

/// A vision model that turns a clip and a prompt into reasoning and
/// actions.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn generate(&self, request: &ReasoningRequest<'_>) -> Result<ReasoningReply, InferenceError>;
}
