use std::{process::Stdio, time::Duration};

use tokio::{process::Command, time::timeout};

use super::{container, ffmpeg, CaptureError, CaptureSettings};
use crate::models::{CaptureWindowSpec, Clip};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Record exactly `duration` with a self-terminating `ffmpeg` run.
///
/// Falls back to full screen once if the window capture cannot start.
pub async fn capture_fixed(
    settings: &CaptureSettings,
    duration: Duration,
    fps: u32,
    spec: &CaptureWindowSpec,
) -> Result<Clip, CaptureError> {
    match run_fixed(settings, duration, fps, spec).await {
        Err(CaptureError::StartFailure(reason)) if !spec.is_full_screen() => {
            log_warn!("Window capture failed ({reason}), retrying full screen");
            run_fixed(settings, duration, fps, &CaptureWindowSpec::full_screen()).await
        }
        other => other,
    }
}

async fn run_fixed(
    settings: &CaptureSettings,
    duration: Duration,
    fps: u32,
    spec: &CaptureWindowSpec,
) -> Result<Clip, CaptureError> {
    let output = tempfile::Builder::new()
        .prefix("playerai-fixed-")
        .suffix(".mp4")
        .tempfile()?
        .into_temp_path();

    let args = ffmpeg::fixed_args(
        settings.platform,
        fps,
        spec,
        &settings.display,
        &output,
        settings.max_width,
        duration,
    );

    let limit = duration + settings.fixed_capture_margin;
    let run = Command::new(&settings.ffmpeg_bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let out = match timeout(limit, run).await {
        Err(_) => return Err(CaptureError::Timeout(limit)),
        Ok(Err(err)) => {
            return Err(CaptureError::StartFailure(format!(
                "failed to launch {}: {err}",
                settings.ffmpeg_bin.display()
            )))
        }
        Ok(Ok(out)) => out,
    };

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let count = stderr.chars().count();
        let tail: String = stderr.chars().skip(count.saturating_sub(500)).collect();
        return Err(CaptureError::StartFailure(format!(
            "ffmpeg exited with {}: {}",
            out.status,
            tail.trim()
        )));
    }

    let bytes = tokio::fs::read(&output).await?;
    if let Err(err) = output.close() {
        log_warn!("Could not delete capture temp file: {err}");
    }
    container::check_min_size(&bytes)?;

    log_info!(
        "Captured {:.1}s clip ({}KB)",
        duration.as_secs_f64(),
        bytes.len() / 1024
    );
    Ok(Clip::new(bytes, duration))
}
