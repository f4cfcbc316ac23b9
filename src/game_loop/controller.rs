use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{LoopState, LoopStatus};

use super::loop_worker::game_loop;
use super::sink::push_status;
use super::{LoopRuntime, LoopServices};

struct Worker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns the single game loop of this process.
#[derive(Clone)]
pub struct LoopController {
    services: LoopServices,
    runtime: Arc<Mutex<LoopRuntime>>,
    worker: Arc<Mutex<Option<Worker>>>,
}

impl LoopController {
    pub fn new(services: LoopServices) -> Self {
        Self {
            services,
            runtime: Arc::new(Mutex::new(LoopRuntime::new())),
            worker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn services(&self) -> &LoopServices {
        &self.services
    }

    pub async fn snapshot(&self) -> LoopRuntime {
        self.runtime.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.state == LoopState::Running
    }

    /// Start the loop. `Ok(false)` if it is already running.
    pub async fn start(&self) -> Result<bool> {
        let mut worker = self.worker.lock().await;

        if self.runtime.lock().await.is_active() {
            return Ok(false);
        }

        // A loop that ended in the error state still has its finished task.
        if let Some(stale) = worker.take() {
            stale.cancel_token.cancel();
            stale
                .handle
                .await
                .context("previous game loop task failed to join")?;
        }

        match self.services.clips.purge().await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {removed} stale debug clips"),
            Err(err) => warn!("Could not purge stale clips: {err:#}"),
        }

        let input = (self.services.input_factory)();
        let run_id = Uuid::new_v4().to_string();
        info!("Starting game loop {run_id} with {} input", input.name());

        self.runtime.lock().await.begin(run_id, Utc::now());
        push_status(
            self.services.sink.as_ref(),
            LoopStatus::new(LoopState::Running, 0),
        )
        .await;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(game_loop(
            self.services.clone(),
            input,
            Arc::clone(&self.runtime),
            cancel_token.clone(),
        ));

        *worker = Some(Worker {
            handle,
            cancel_token,
        });
        Ok(true)
    }

    /// Stop the loop and wait for the worker to clean up. `Ok(false)` if
    /// nothing was running.
    pub async fn stop(&self) -> Result<bool> {
        let mut worker = self.worker.lock().await;
        let Some(current) = worker.take() else {
            return Ok(false);
        };

        let iteration = {
            let mut runtime = self.runtime.lock().await;
            if runtime.state != LoopState::Running {
                drop(runtime);
                current
                    .handle
                    .await
                    .context("game loop task failed to join")?;
                return Ok(false);
            }
            runtime.begin_stopping();
            runtime.iteration
        };

        // Cancel before announcing, so the worker cannot report or act after
        // the Stopping status.
        current.cancel_token.cancel();
        push_status(
            self.services.sink.as_ref(),
            LoopStatus::new(LoopState::Stopping, iteration),
        )
        .await;

        let joined = current.handle.await;

        let iteration = {
            let mut runtime = self.runtime.lock().await;
            runtime.finish();
            runtime.iteration
        };
        push_status(
            self.services.sink.as_ref(),
            LoopStatus::new(LoopState::Idle, iteration),
        )
        .await;

        joined.context("game loop task failed to join")?;
        info!("Game loop stopped after {iteration} iterations");
        Ok(true)
    }
}
