use async_trait::async_trait;
use std::time::Duration;

use super::executor::{InputBackend, InputError};
use crate::models::{Action, ActionKind};

/// Logs actions instead of performing them. Waits still sleep so iteration
/// timing matches a real run.
#[derive(Debug, Default)]
pub struct DryRunBackend;

#[async_trait]
impl InputBackend for DryRunBackend {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn execute(&self, action: &Action) -> Result<(), InputError> {
        match (action.x, action.y) {
            (Some(x), Some(y)) => log::info!("[dry-run] {} at ({x}, {y})", action.describe()),
            _ => log::info!("[dry-run] {}", action.describe()),
        }
        if action.kind == ActionKind::Wait {
            if let Some(seconds) = action.duration.filter(|d| *d > 0.0) {
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            }
        }
        Ok(())
    }
}
