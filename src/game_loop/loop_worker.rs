use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::actions::{execute_actions, sanitize_all, scale_actions, InputBackend, ScreenInfo};
use crate::capture::ActiveRecording;
use crate::desktop::FALLBACK_SCREEN;
use crate::models::{CaptureWindowSpec, Clip, InferenceResult, LoopState, LoopStatus};
use crate::settings::AppConfig;

use super::sink::push_status;
use super::{LoopRuntime, LoopServices};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

type SessionSlot = Option<Box<dyn ActiveRecording>>;

/// Runs until cancelled or until the loop fails. The active recording lives
/// in a slot outside the cycle so it can be killed whichever way the cycle
/// ends.
pub async fn game_loop(
    services: LoopServices,
    input: Arc<dyn InputBackend>,
    runtime: Arc<Mutex<LoopRuntime>>,
    cancel_token: CancellationToken,
) {
    let mut active: SessionSlot = None;

    let outcome = tokio::select! {
        biased;
        _ = cancel_token.cancelled() => None,
        result = run_cycle(&services, input.as_ref(), &runtime, &mut active) => Some(result),
    };

    if let Some(mut session) = active.take() {
        let started = Instant::now();
        session.kill().await;
        log_info!("Killed active recording in {}ms", started.elapsed().as_millis());
    }

    match outcome {
        None => log_info!("Game loop cancelled"),
        Some(Ok(())) => log_info!("Game loop finished"),
        Some(Err(err)) => {
            let message = format!("{err:#}");
            log_error!("Game loop fatal error: {message}");
            let iteration = {
                let mut guard = runtime.lock().await;
                if !guard.fail(message.clone()) {
                    return;
                }
                guard.iteration
            };
            push_status(
                services.sink.as_ref(),
                LoopStatus::new(LoopState::Error, iteration).with_error(message),
            )
            .await;
        }
    }
}

struct IterationOutcome {
    clip: Clip,
    result: InferenceResult,
}

async fn run_cycle(
    services: &LoopServices,
    input: &dyn InputBackend,
    runtime: &Mutex<LoopRuntime>,
    active: &mut SessionSlot,
) -> Result<()> {
    let config = services.config.snapshot();

    // Give the user a moment to switch to the game window
    tokio::time::sleep(services.timing.startup_delay).await;

    let (_, spec) = resolve_target(services, &config, true).await;
    let baseline_start = Instant::now();
    let mut clip = services
        .recorder
        .capture_fixed(config.capture_duration(), config.capture_fps, &spec)
        .await
        .context("initial capture failed")?;
    log_info!(
        "Initial capture: {}KB in {}ms",
        clip.len() / 1024,
        baseline_start.elapsed().as_millis()
    );

    let mut history: Option<InferenceResult> = None;
    let mut last_fps = 0.0;

    loop {
        let iteration = {
            let mut guard = runtime.lock().await;
            if guard.state != LoopState::Running {
                break;
            }
            guard.next_iteration()
        };
        let iter_start = Instant::now();
        let config = services.config.snapshot();

        let outcome = run_iteration(
            services,
            input,
            runtime,
            &config,
            iteration,
            &clip,
            history.as_ref(),
            last_fps,
            active,
        )
        .await;

        match outcome {
            Ok(None) => break,
            Ok(Some(done)) => {
                clip = done.clip;
                history = Some(done.result);
                let elapsed = iter_start.elapsed().as_secs_f64();
                last_fps = if elapsed > 0.0 { 1.0 / elapsed } else { 0.0 };
                runtime.lock().await.fps = last_fps;
                log_info!(
                    "Iteration {} took {}ms ({:.2} it/s)",
                    iteration,
                    iter_start.elapsed().as_millis(),
                    last_fps
                );
            }
            Err(err) => {
                let message = format!("{err:#}");
                log_error!("Loop iteration {iteration} error: {message}");

                if let Some(mut session) = active.take() {
                    session.kill().await;
                }

                let (_, spec) = resolve_target(services, &config, false).await;
                match services
                    .recorder
                    .capture_fixed(config.capture_duration(), config.capture_fps, &spec)
                    .await
                {
                    Ok(fresh) => clip = fresh,
                    Err(capture_err) => {
                        log_warn!("Baseline recapture failed, reusing previous clip: {capture_err}")
                    }
                }

                let status = LoopStatus::new(LoopState::Running, iteration)
                    .with_fps(last_fps)
                    .with_error(message);
                if !push_while_running(services, runtime, status).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_iteration(
    services: &LoopServices,
    input: &dyn InputBackend,
    runtime: &Mutex<LoopRuntime>,
    config: &AppConfig,
    iteration: u64,
    clip: &Clip,
    history: Option<&InferenceResult>,
    last_fps: f64,
    active: &mut SessionSlot,
) -> Result<Option<IterationOutcome>> {
    let target = config.capture_duration();
    let (screen, spec) = resolve_target(services, config, false).await;

    let clip_url = match services.clips.save(iteration, &clip.bytes).await {
        Ok(url) => Some(url),
        Err(err) => {
            log_warn!("Could not save debug clip for iteration {iteration}: {err:#}");
            None
        }
    };

    let step = Instant::now();
    let session = services
        .recorder
        .start(config.capture_fps, &spec)
        .await
        .context("recording start failed")?;
    *active = Some(session);
    log_info!("Recording started - took {}ms", step.elapsed().as_millis());

    let step = Instant::now();
    let mut result = services.gateway.analyze(clip, config, &screen, history).await;
    log_info!("Inference - took {}ms", step.elapsed().as_millis());

    scale_actions(&mut result.actions, &screen);
    result.actions = sanitize_all(std::mem::take(&mut result.actions));

    let mut status = LoopStatus::new(LoopState::Running, iteration).with_fps(last_fps);
    status.reasoning = result.reasoning.clone();
    status.actions = result.actions.clone();
    status.clip_url = clip_url;
    if !push_while_running(services, runtime, status).await {
        log_info!("Loop stopping, dropping actions of iteration {iteration}");
        return Ok(None);
    }

    if !result.actions.is_empty() {
        if let Some(title) = &config.target_window {
            focus_window(services, title).await;
            tokio::time::sleep(services.timing.focus_settle).await;
        }
        let step = Instant::now();
        let executed = execute_actions(input, &result.actions, config.action_delay())
            .await
            .context("input backend failed")?;
        log_info!(
            "Executed {}/{} actions - took {}ms",
            executed,
            result.actions.len(),
            step.elapsed().as_millis()
        );
    }

    let elapsed = active
        .as_ref()
        .map(|session| session.elapsed())
        .ok_or_else(|| anyhow!("recording session missing"))?;
    if let Some(remaining) = target.checked_sub(elapsed).filter(|d| !d.is_zero()) {
        tokio::time::sleep(remaining).await;
    }

    let step = Instant::now();
    let stopped = match active.as_mut() {
        Some(session) => session.stop_and_get(target).await,
        None => return Err(anyhow!("recording session missing")),
    };
    *active = None;
    let next = stopped.context("recording stop failed")?;
    log_info!(
        "Recording stopped: {}KB, {:.1}s - took {}ms",
        next.len() / 1024,
        next.duration.as_secs_f64(),
        step.elapsed().as_millis()
    );

    Ok(Some(IterationOutcome { clip: next, result }))
}

/// Push `status` only while the loop is still Running. The runtime lock is
/// held across the push so `stop()` cannot slip its Stopping status in
/// ahead of it.
async fn push_while_running(
    services: &LoopServices,
    runtime: &Mutex<LoopRuntime>,
    status: LoopStatus,
) -> bool {
    let guard = runtime.lock().await;
    if guard.state != LoopState::Running {
        return false;
    }
    push_status(services.sink.as_ref(), status).await;
    drop(guard);
    true
}

/// Screen geometry for coordinate mapping and the capture target, fresh for
/// this iteration. With `focus`, the target window is raised first.
async fn resolve_target(
    services: &LoopServices,
    config: &AppConfig,
    focus: bool,
) -> (ScreenInfo, CaptureWindowSpec) {
    let windows = Arc::clone(&services.windows);
    let title = config.target_window.clone();
    let settle = services.timing.focus_settle;

    let resolved = tokio::task::spawn_blocking(move || {
        let geometry = title.as_deref().and_then(|title| {
            if focus && !windows.focus_window(title) {
                log::warn!("Target window '{title}' not found to focus");
            }
            if focus {
                std::thread::sleep(settle);
            }
            windows.window_geometry(title)
        });
        let screen = match geometry {
            Some(geometry) => ScreenInfo::for_window(geometry),
            None => {
                let (width, height) = windows.screen_size();
                ScreenInfo::full_screen(width, height)
            }
        };
        let spec = CaptureWindowSpec {
            title,
            rect: geometry,
        };
        (screen, spec)
    })
    .await;

    match resolved {
        Ok(resolved) => resolved,
        Err(err) => {
            log_warn!("Window lookup worker failed: {err}");
            let (width, height) = FALLBACK_SCREEN;
            (
                ScreenInfo::full_screen(width, height),
                CaptureWindowSpec {
                    title: config.target_window.clone(),
                    rect: None,
                },
            )
        }
    }
}

async fn focus_window(services: &LoopServices, title: &str) {
    let windows = Arc::clone(&services.windows);
    let title = title.to_string();
    match tokio::task::spawn_blocking(move || windows.focus_window(&title)).await {
        Ok(true) => {}
        Ok(false) => log_warn!("Could not focus target window"),
        Err(err) => log_warn!("Focus worker failed: {err}"),
    }
}

/// Timings the loop waits on that are not user configuration.
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    /// Pause after start so the user can bring the game forward.
    pub startup_delay: Duration,
    /// Pause after focusing the target window.
    pub focus_settle: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(1),
            focus_settle: Duration::from_millis(50),
        }
    }
}
