//! Screen recording through an `ffmpeg` child process.
//!
//! [`RecordingSession`] is the open-ended recorder used by the pipelined
//! loop; [`baseline::capture_fixed`] is the fixed-duration capture used to
//! seed the loop and to recover after a failed iteration.

pub mod baseline;
pub mod container;
pub mod ffmpeg;
pub mod session;

use async_trait::async_trait;
use std::{path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;

use crate::models::{CaptureWindowSpec, Clip};

pub use ffmpeg::{CapturePlatform, VIDEO_MAX_WIDTH};
pub use session::RecordingSession;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("recording could not start: {0}")]
    StartFailure(String),
    #[error("{0}")]
    EmptyCapture(String),
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tunables for the ffmpeg recorder. Defaults match a desktop run; tests
/// shorten the waits and point `ffmpeg_bin` at a stand-in.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub ffmpeg_bin: PathBuf,
    pub platform: CapturePlatform,
    /// X11 display to grab (ignored elsewhere).
    pub display: String,
    pub max_width: u32,
    /// How long a fresh recorder must survive before it counts as started.
    pub start_grace: Duration,
    /// Recordings longer than target + slack get trimmed.
    pub trim_slack: Duration,
    pub trim_timeout: Duration,
    /// Wait after a graceful terminate before forcing a kill on stop.
    pub terminate_wait: Duration,
    /// Same, on the kill path used during cancellation.
    pub kill_wait: Duration,
    /// Extra time a fixed-duration capture gets before it is abandoned.
    pub fixed_capture_margin: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let display = std::env::var("DISPLAY")
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| ":0.0".to_string());
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            platform: CapturePlatform::current(),
            display,
            max_width: VIDEO_MAX_WIDTH,
            start_grace: Duration::from_millis(300),
            trim_slack: Duration::from_millis(500),
            trim_timeout: Duration::from_secs(15),
            terminate_wait: Duration::from_secs(5),
            kill_wait: Duration::from_secs(2),
            fixed_capture_margin: Duration::from_secs(10),
        }
    }
}

/// Produces recordings. The loop owns at most one [`ActiveRecording`] at a
/// time.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Start an open-ended recording, retrying once full-screen if the
    /// window-specific recorder fails to come up.
    async fn start(
        &self,
        fps: u32,
        spec: &CaptureWindowSpec,
    ) -> Result<Box<dyn ActiveRecording>, CaptureError>;

    /// Record exactly `duration` and return it (no pipelining).
    async fn capture_fixed(
        &self,
        duration: Duration,
        fps: u32,
        spec: &CaptureWindowSpec,
    ) -> Result<Clip, CaptureError>;
}

#[async_trait]
pub trait ActiveRecording: Send {
    fn elapsed(&self) -> Duration;

    /// Stop gracefully and return the clip, trimmed to the trailing
    /// `target` when the recording overran it. Calling it again after the
    /// session finished returns `EmptyCapture`.
    async fn stop_and_get(&mut self, target: Duration) -> Result<Clip, CaptureError>;

    /// Stop without producing a clip. Bounded by the kill wait; safe to
    /// call repeatedly.
    async fn kill(&mut self);
}

/// [`Recorder`] backed by the `ffmpeg` binary.
#[derive(Clone)]
pub struct FfmpegRecorder {
    settings: Arc<CaptureSettings>,
}

impl FfmpegRecorder {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    async fn start(
        &self,
        fps: u32,
        spec: &CaptureWindowSpec,
    ) -> Result<Box<dyn ActiveRecording>, CaptureError> {
        let session = RecordingSession::start(Arc::clone(&self.settings), fps, spec).await?;
        Ok(Box::new(session))
    }

    async fn capture_fixed(
        &self,
        duration: Duration,
        fps: u32,
        spec: &CaptureWindowSpec,
    ) -> Result<Clip, CaptureError> {
        baseline::capture_fixed(&self.settings, duration, fps, spec).await
    }
}
