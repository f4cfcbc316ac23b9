use std::{
    collections::VecDeque,
    path::Path,
    process::Stdio,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStderr, Command},
    task::JoinHandle,
    time::timeout,
};

use super::{container, ffmpeg, ActiveRecording, CaptureError, CaptureSettings};
use crate::models::{CaptureWindowSpec, Clip};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const STDERR_TAIL_LINES: usize = 50;
const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const MIN_TRIMMED_BYTES: usize = 100;
const WINDOW_NOT_FOUND_MARKERS: [&str; 3] =
    ["can't find window", "cannot find window", "window not found"];

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// One live `ffmpeg` recording writing a fragmented MP4 to a temp file.
///
/// The child, its stderr drain task and the temp file are released together:
/// [`stop_and_get`](ActiveRecording::stop_and_get) and
/// [`kill`](ActiveRecording::kill) both take them out of the session, so a
/// second call finds nothing left to do. Dropping a session that was never
/// stopped kills the child (`kill_on_drop`) and deletes the file.
pub struct RecordingSession {
    settings: Arc<CaptureSettings>,
    output: Option<TempPath>,
    child: Option<Child>,
    drain: Option<JoinHandle<()>>,
    stderr_tail: StderrTail,
    started_at: Instant,
    stopped_at: Option<Instant>,
    fps: u32,
}

impl RecordingSession {
    pub async fn start(
        settings: Arc<CaptureSettings>,
        fps: u32,
        spec: &CaptureWindowSpec,
    ) -> Result<Self, CaptureError> {
        match Self::spawn(Arc::clone(&settings), fps, spec).await {
            Ok(session) => Ok(session),
            Err(err) if !spec.is_full_screen() => {
                log_warn!("Window capture failed ({err}), falling back to full screen");
                Self::spawn(settings, fps, &CaptureWindowSpec::full_screen())
                    .await
                    .map_err(|fallback| {
                        CaptureError::StartFailure(format!(
                            "full-screen fallback failed: {fallback}"
                        ))
                    })
            }
            Err(err) => Err(err),
        }
    }

    async fn spawn(
        settings: Arc<CaptureSettings>,
        fps: u32,
        spec: &CaptureWindowSpec,
    ) -> Result<Self, CaptureError> {
        let output = tempfile::Builder::new()
            .prefix("playerai-rec-")
            .suffix(".mp4")
            .tempfile()?
            .into_temp_path();

        let args = ffmpeg::session_args(
            settings.platform,
            fps,
            spec,
            &settings.display,
            &output,
            settings.max_width,
        );
        log_debug!(
            "Starting recorder: {} {}",
            settings.ffmpeg_bin.display(),
            args.join(" ")
        );

        let mut child = Command::new(&settings.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                CaptureError::StartFailure(format!(
                    "failed to launch {}: {err}",
                    settings.ffmpeg_bin.display()
                ))
            })?;

        // The drain must run for as long as the child does: a full stderr
        // pipe blocks ffmpeg and silently stops the recording.
        let stderr = child.stderr.take().ok_or_else(|| {
            CaptureError::StartFailure("recorder stderr was not captured".to_string())
        })?;
        let stderr_tail: StderrTail =
            Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let drain = tokio::spawn(drain_stderr(stderr, Arc::clone(&stderr_tail)));

        let mut session = Self {
            settings,
            output: Some(output),
            child: Some(child),
            drain: Some(drain),
            stderr_tail,
            started_at: Instant::now(),
            stopped_at: None,
            fps,
        };

        tokio::time::sleep(session.settings.start_grace).await;

        let exited = match session.child.as_mut() {
            Some(child) => child.try_wait()?,
            None => None,
        };
        if let Some(status) = exited {
            session.finish_drain().await;
            let excerpt = session.stderr_excerpt(300);
            session.remove_output();
            return Err(CaptureError::StartFailure(format!(
                "ffmpeg exited during startup ({status}): {excerpt}"
            )));
        }

        if session.window_not_found() {
            session.kill().await;
            return Err(CaptureError::StartFailure(
                "capture target window not found".to_string(),
            ));
        }

        log_info!(
            "Recording started at {} fps ({})",
            session.fps,
            if spec.is_full_screen() {
                "full screen".to_string()
            } else {
                format!("window {:?}", spec.title.as_deref().unwrap_or("<region>"))
            }
        );
        Ok(session)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn is_finished(&self) -> bool {
        self.output.is_none()
    }

    /// Ask the child to exit, escalating to a kill after `wait`, then reap
    /// the stderr drain.
    async fn terminate(&mut self, wait: Duration) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(status)) => log_debug!("Recorder already exited ({status})"),
                _ => {
                    signal_terminate(&mut child);
                    match timeout(wait, child.wait()).await {
                        Ok(Ok(status)) => log_debug!("Recorder exited ({status})"),
                        Ok(Err(err)) => log_warn!("Waiting for recorder failed: {err}"),
                        Err(_) => {
                            log_warn!("Recorder ignored terminate for {wait:?}, killing");
                            if let Err(err) = child.kill().await {
                                log_warn!("Failed to kill recorder: {err}");
                            }
                        }
                    }
                }
            }
            self.stopped_at = Some(Instant::now());
        }
        self.finish_drain().await;
    }

    async fn finish_drain(&mut self) {
        if let Some(handle) = self.drain.take() {
            // Dropping the handle on timeout detaches the task; it still
            // runs until the pipe closes.
            if timeout(DRAIN_JOIN_TIMEOUT, handle).await.is_err() {
                log_warn!("Recorder stderr still open after exit, leaving drain attached");
            }
        }
    }

    fn remove_output(&mut self) {
        if let Some(path) = self.output.take() {
            if let Err(err) = path.close() {
                log_warn!("Could not delete recording temp file: {err}");
            }
        }
    }

    fn window_not_found(&self) -> bool {
        let tail = self.stderr_tail.lock().unwrap_or_else(PoisonError::into_inner);
        tail.iter().any(|line| {
            let line = line.to_lowercase();
            WINDOW_NOT_FOUND_MARKERS
                .iter()
                .any(|marker| line.contains(marker))
        })
    }

    fn stderr_excerpt(&self, max_chars: usize) -> String {
        let tail = self.stderr_tail.lock().unwrap_or_else(PoisonError::into_inner);
        let joined = tail.iter().cloned().collect::<Vec<_>>().join(" | ");
        tail_chars(&joined, max_chars)
    }

    async fn collect(
        &self,
        output: &Path,
        recorded: Duration,
        target: Duration,
    ) -> Result<Clip, CaptureError> {
        let raw = tokio::fs::read(output).await?;
        if let Err(err) = container::check_min_size(&raw) {
            log_warn!("{err}; recorder said: {}", self.stderr_excerpt(300));
            return Err(err);
        }

        log_info!(
            "Session recorded {:.1}s, {}KB",
            recorded.as_secs_f64(),
            raw.len() / 1024
        );

        if recorded > target + self.settings.trim_slack {
            match trim_tail(&self.settings, output, target).await {
                Some(trimmed) => {
                    log_info!(
                        "Trimmed {:.1}s recording to last {:.1}s ({}KB -> {}KB)",
                        recorded.as_secs_f64(),
                        target.as_secs_f64(),
                        raw.len() / 1024,
                        trimmed.len() / 1024
                    );
                    return Ok(Clip::new(trimmed, target));
                }
                None => log_warn!("Trim failed, using full recording"),
            }
        }

        Ok(Clip::new(raw, recorded))
    }
}

#[async_trait]
impl ActiveRecording for RecordingSession {
    fn elapsed(&self) -> Duration {
        self.stopped_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }

    async fn stop_and_get(&mut self, target: Duration) -> Result<Clip, CaptureError> {
        let Some(output) = self.output.take() else {
            return Err(CaptureError::EmptyCapture(
                "recording session already finished".to_string(),
            ));
        };

        self.terminate(self.settings.terminate_wait).await;
        let recorded = self.elapsed();
        let result = self.collect(&output, recorded, target).await;

        if let Err(err) = output.close() {
            log_warn!("Could not delete recording temp file: {err}");
        }
        result
    }

    async fn kill(&mut self) {
        self.terminate(self.settings.kill_wait).await;
        self.remove_output();
    }
}

async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                let mut guard = tail.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.len() == STDERR_TAIL_LINES {
                    guard.pop_front();
                }
                guard.push_back(line);
            }
            Err(err) => {
                log::debug!("Recorder stderr closed: {err}");
                break;
            }
        }
    }
}

/// Re-encode the last `duration` of `input`. `None` on any failure; the
/// caller keeps the untrimmed clip.
async fn trim_tail(settings: &CaptureSettings, input: &Path, duration: Duration) -> Option<Vec<u8>> {
    let output = match tempfile::Builder::new()
        .prefix("playerai-trim-")
        .suffix(".mp4")
        .tempfile()
    {
        Ok(file) => file.into_temp_path(),
        Err(err) => {
            log_warn!("Trim could not create output file: {err}");
            return None;
        }
    };

    let args = ffmpeg::trim_args(input, &output, duration);
    let run = Command::new(&settings.ffmpeg_bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let trimmed = match timeout(settings.trim_timeout, run).await {
        Err(_) => {
            log_warn!("Trim timed out after {:?}", settings.trim_timeout);
            None
        }
        Ok(Err(err)) => {
            log_warn!("Trim could not run: {err}");
            None
        }
        Ok(Ok(out)) if !out.status.success() => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            log_warn!("Trim failed ({}): {}", out.status, tail_chars(&stderr, 200));
            None
        }
        Ok(Ok(_)) => match tokio::fs::read(&output).await {
            Ok(bytes) if bytes.len() > MIN_TRIMMED_BYTES => Some(bytes),
            Ok(bytes) => {
                log_warn!("Trim produced only {} bytes", bytes.len());
                None
            }
            Err(err) => {
                log_warn!("Trim output unreadable: {err}");
                None
            }
        },
    };

    if let Err(err) = output.close() {
        log_warn!("Could not delete trim temp file: {err}");
    }
    trimmed
}

#[cfg(unix)]
fn signal_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        log_warn!("SIGTERM to recorder failed ({err}), killing instead");
        if let Err(err) = child.start_kill() {
            log_warn!("Failed to kill recorder: {err}");
        }
    }
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        log_warn!("Failed to stop recorder: {err}");
    }
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}
