use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Action, ActionKind};

#[derive(Debug, Error)]
pub enum InputError {
    /// One action could not be performed; the rest of the sequence runs.
    #[error("{kind} failed: {reason}")]
    Action { kind: ActionKind, reason: String },
    /// The backend itself is unusable.
    #[error("input backend unavailable: {0}")]
    Fatal(String),
}

impl InputError {
    pub fn action(kind: ActionKind, reason: impl Into<String>) -> Self {
        InputError::Action {
            kind,
            reason: reason.into(),
        }
    }
}

/// Platform capability that performs one physical input action.
#[async_trait]
pub trait InputBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, action: &Action) -> Result<(), InputError>;
}

/// Run `actions` in order with `delay` between them. Per-action failures
/// are logged and skipped; a fatal backend error stops the sequence.
/// Returns how many actions succeeded.
pub async fn execute_actions(
    backend: &dyn InputBackend,
    actions: &[Action],
    delay: Duration,
) -> Result<usize, InputError> {
    let mut executed = 0;
    for (index, action) in actions.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match backend.execute(action).await {
            Ok(()) => executed += 1,
            Err(err @ InputError::Fatal(_)) => {
                log::error!("{} backend gave up: {err}", backend.name());
                return Err(err);
            }
            Err(err) => log::error!("Failed to execute {}: {err}", action.describe()),
        }
    }
    Ok(executed)
}
