use serde::{Deserialize, Serialize};

use super::Action;

/// What the reasoning service returns for one clip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceResult {
    pub reasoning: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl InferenceResult {
    /// A result produced locally instead of by the service, carrying only
    /// an explanation and no actions.
    pub fn synthetic(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            actions: Vec::new(),
        }
    }
}
