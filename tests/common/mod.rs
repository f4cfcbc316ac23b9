#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use playerai_lib::actions::{InputBackend, InputError};
use playerai_lib::capture::{ActiveRecording, CaptureError, Recorder};
use playerai_lib::desktop::WindowQuery;
use playerai_lib::game_loop::StatusSink;
use playerai_lib::inference::{InferenceError, ReasoningBackend, ReasoningReply, ReasoningRequest};
use playerai_lib::models::{
    Action, CaptureWindowSpec, Clip, InferenceResult, LoopState, LoopStatus, WindowGeometry,
    WindowInfo,
};

/// Bytes that pass the container checks: an `ftyp` header padded past the
/// minimum size.
pub fn mp4_bytes() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x18];
    bytes.extend_from_slice(b"ftypisom");
    bytes.resize(4096, 0);
    bytes
}

pub fn mp4_clip() -> Clip {
    Clip::new(mp4_bytes(), Duration::from_secs(1))
}

/// Polls `check` on the tokio clock until it holds.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..20_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[derive(Default)]
pub struct FakeRecorder {
    pub live: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub kills: Arc<AtomicUsize>,
    pub starts: AtomicUsize,
    pub fixed: AtomicUsize,
    /// Baseline captures fail.
    pub fail_fixed: bool,
    /// 1-based session numbers whose stop yields no frames.
    pub empty_stop_on: Vec<usize>,
}

impl FakeRecorder {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn fixed(&self) -> usize {
        self.fixed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn start(
        &self,
        _fps: u32,
        _spec: &CaptureWindowSpec,
    ) -> Result<Box<dyn ActiveRecording>, CaptureError> {
        let number = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            started: Instant::now(),
            open: true,
            empty: self.empty_stop_on.contains(&number),
            live: Arc::clone(&self.live),
            kills: Arc::clone(&self.kills),
        }))
    }

    async fn capture_fixed(
        &self,
        duration: Duration,
        _fps: u32,
        _spec: &CaptureWindowSpec,
    ) -> Result<Clip, CaptureError> {
        self.fixed.fetch_add(1, Ordering::SeqCst);
        if self.fail_fixed {
            return Err(CaptureError::StartFailure("no display".into()));
        }
        Ok(Clip::new(mp4_bytes(), duration))
    }
}

struct FakeSession {
    started: Instant,
    open: bool,
    empty: bool,
    live: Arc<AtomicUsize>,
    kills: Arc<AtomicUsize>,
}

impl FakeSession {
    fn close(&mut self) -> bool {
        let was_open = self.open;
        if was_open {
            self.open = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        was_open
    }
}

#[async_trait]
impl ActiveRecording for FakeSession {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    async fn stop_and_get(&mut self, target: Duration) -> Result<Clip, CaptureError> {
        if !self.close() {
            return Err(CaptureError::EmptyCapture("recording session already finished".into()));
        }
        if self.empty {
            return Err(CaptureError::EmptyCapture("ffmpeg captured no frames".into()));
        }
        Ok(Clip::new(mp4_bytes(), target))
    }

    async fn kill(&mut self) {
        if self.close() {
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replies with `reply` every time, except that the first `hang_calls`
/// calls never complete.
pub struct FakeBackend {
    pub calls: AtomicUsize,
    pub hang_calls: usize,
    pub reply_after: Duration,
    pub reply: InferenceResult,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn replying(reply: InferenceResult) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            hang_calls: 0,
            reply_after: Duration::ZERO,
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn hanging(mut self, calls: usize) -> Self {
        self.hang_calls = calls;
        self
    }

    pub fn delayed(mut self, reply_after: Duration) -> Self {
        self.reply_after = reply_after;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningBackend for FakeBackend {
    async fn generate(&self, request: &ReasoningRequest<'_>) -> Result<ReasoningReply, InferenceError> {
        let number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if number <= self.hang_calls {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.reply_after).await;
        Ok(ReasoningReply::parsed(self.reply.clone()))
    }
}

/// Plays back scripted outcomes in order and records when each call came
/// in. Once the script runs out, calls never complete.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ReasoningReply, InferenceError>>>,
    pub calls: Mutex<Vec<Instant>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ReasoningReply, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn generate(&self, _request: &ReasoningRequest<'_>) -> Result<ReasoningReply, InferenceError> {
        self.calls.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}

/// Records every action it is asked to perform. Call number `fatal_on`
/// (1-based) fails as if the display went away.
#[derive(Default)]
pub struct RecordingInput {
    pub executed: Mutex<Vec<Action>>,
    pub calls: AtomicUsize,
    pub fatal_on: Option<usize>,
}

impl RecordingInput {
    pub fn executed(&self) -> Vec<Action> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputBackend for RecordingInput {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn execute(&self, action: &Action) -> Result<(), InputError> {
        let number = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fatal_on == Some(number) {
            return Err(InputError::Fatal("display went away".into()));
        }
        self.executed.lock().unwrap().push(action.clone());
        Ok(())
    }
}

/// A 1920x1080 desktop with no windows.
pub struct FixedScreen;

impl WindowQuery for FixedScreen {
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn window_geometry(&self, _title: &str) -> Option<WindowGeometry> {
        None
    }

    fn focus_window(&self, _title: &str) -> bool {
        false
    }

    fn screen_size(&self) -> (u32, u32) {
        (1920, 1080)
    }
}

#[derive(Default)]
pub struct CollectingSink {
    statuses: Mutex<Vec<LoopStatus>>,
    stall: Option<(LoopState, Duration)>,
}

impl CollectingSink {
    /// Records every status, then sits on pushes of `state` for `stall`.
    pub fn stalling_on(state: LoopState, stall: Duration) -> Self {
        Self {
            statuses: Mutex::new(Vec::new()),
            stall: Some((state, stall)),
        }
    }

    pub fn statuses(&self) -> Vec<LoopStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn any(&self, pred: impl Fn(&LoopStatus) -> bool) -> bool {
        self.statuses.lock().unwrap().iter().any(pred)
    }
}

#[async_trait]
impl StatusSink for CollectingSink {
    async fn push(&self, status: LoopStatus) -> anyhow::Result<()> {
        let state = status.state;
        self.statuses.lock().unwrap().push(status);
        if let Some((stalled, stall)) = self.stall {
            if stalled == state {
                tokio::time::sleep(stall).await;
            }
        }
        Ok(())
    }
}
