mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{wait_until, CollectingSink, FakeBackend, FakeRecorder, FixedScreen, RecordingInput};
use playerai_lib::actions::InputBackend;
use playerai_lib::game_loop::commands::{start_loop, ALREADY_RUNNING, NO_API_KEY};
use playerai_lib::game_loop::{ClipStore, LoopController, LoopServices, LoopTiming};
use playerai_lib::inference::gateway::API_TIMEOUT;
use playerai_lib::inference::InferenceGateway;
use playerai_lib::models::{Action, ActionKind, InferenceResult, LoopState};
use playerai_lib::settings::{AppConfig, ConfigStore};
use tempfile::TempDir;

struct Harness {
    controller: LoopController,
    recorder: Arc<FakeRecorder>,
    backend: Arc<FakeBackend>,
    input: Arc<RecordingInput>,
    sink: Arc<CollectingSink>,
    config: ConfigStore,
    clips: ClipStore,
    _clips_dir: TempDir,
}

fn click_reply() -> InferenceResult {
    InferenceResult {
        reasoning: "press the start button".into(),
        actions: vec![Action::new(ActionKind::MouseClick).with_bbox([400, 400, 600, 600])],
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        gemini_api_key: "test-key".into(),
        capture_duration: 1.0,
        action_delay: 0.0,
        max_retries: 0,
        ..AppConfig::default()
    }
}

fn harness_with(
    config: AppConfig,
    recorder: FakeRecorder,
    backend: FakeBackend,
    input: RecordingInput,
) -> Harness {
    harness_with_sink(config, recorder, backend, input, CollectingSink::default())
}

fn harness_with_sink(
    config: AppConfig,
    recorder: FakeRecorder,
    backend: FakeBackend,
    input: RecordingInput,
    sink: CollectingSink,
) -> Harness {
    let clips_dir = tempfile::tempdir().unwrap();
    let clips = ClipStore::new(clips_dir.path().join("clips"));
    let config = ConfigStore::in_memory(config);
    let recorder = Arc::new(recorder);
    let backend = Arc::new(backend);
    let input = Arc::new(input);
    let sink = Arc::new(sink);

    let factory_input = Arc::clone(&input);
    let services = LoopServices {
        config: config.clone(),
        recorder: recorder.clone(),
        gateway: InferenceGateway::new(backend.clone()).with_backoff_base(Duration::from_millis(1)),
        windows: Arc::new(FixedScreen),
        input_factory: Arc::new(move || factory_input.clone() as Arc<dyn InputBackend>),
        clips: clips.clone(),
        sink: sink.clone(),
        timing: LoopTiming {
            startup_delay: Duration::ZERO,
            focus_settle: Duration::ZERO,
        },
    };

    Harness {
        controller: LoopController::new(services),
        recorder,
        backend,
        input,
        sink,
        config,
        clips,
        _clips_dir: clips_dir,
    }
}

fn harness(recorder: FakeRecorder, backend: FakeBackend, input: RecordingInput) -> Harness {
    harness_with(test_config(), recorder, backend, input)
}

fn assert_stopped_cleanly(h: &Harness) {
    let statuses = h.sink.statuses();
    let states: Vec<LoopState> = statuses.iter().rev().take(2).map(|s| s.state).collect();
    assert_eq!(states, vec![LoopState::Idle, LoopState::Stopping]);
    assert_eq!(h.recorder.live(), 0, "a recording outlived the loop");
    assert!(h.recorder.peak() <= 1, "two recordings were live at once");
}

#[tokio::test(start_paused = true)]
async fn click_lands_on_bbox_center() {
    let h = harness(
        FakeRecorder::default(),
        FakeBackend::replying(click_reply()),
        RecordingInput::default(),
    );

    assert!(h.controller.start().await.unwrap());
    wait_until("first click", || !h.input.executed().is_empty()).await;
    assert!(h.controller.stop().await.unwrap());

    let executed = h.input.executed();
    assert_eq!(executed[0].kind, ActionKind::MouseClick);
    assert_eq!((executed[0].x, executed[0].y), (Some(960), Some(540)));

    let statuses = h.sink.statuses();
    assert_eq!(statuses[0].state, LoopState::Running);
    assert_eq!(statuses[0].iteration, 0);
    let first = statuses
        .iter()
        .find(|s| s.iteration == 1 && s.state == LoopState::Running)
        .expect("status for iteration 1");
    assert_eq!(first.reasoning, "press the start button");
    assert_eq!(first.actions[0].x, Some(960));
    assert_eq!(first.clip_url.as_deref(), Some("/api/clips/1"));
    assert!(h.clips.find(1).await.is_some());

    assert_eq!(h.recorder.fixed(), 1);
    assert_stopped_cleanly(&h);
    assert_eq!(h.controller.snapshot().await.state, LoopState::Idle);
}

#[tokio::test(start_paused = true)]
async fn history_reaches_the_next_prompt() {
    let h = harness(
        FakeRecorder::default(),
        FakeBackend::replying(click_reply()),
        RecordingInput::default(),
    );

    h.controller.start().await.unwrap();
    wait_until("second inference", || h.backend.calls() >= 2).await;
    h.controller.stop().await.unwrap();

    let prompts = h.backend.prompts.lock().unwrap().clone();
    assert!(!prompts[0].contains("Previous action"));
    assert!(prompts[1].contains("press the start button"));
    assert!(prompts[1].contains("mouse_click(bbox=[400, 400, 600, 600])"));
}

#[tokio::test(start_paused = true)]
async fn empty_capture_fails_one_iteration_and_loop_continues() {
    let h = harness(
        FakeRecorder {
            empty_stop_on: vec![1],
            ..FakeRecorder::default()
        },
        FakeBackend::replying(click_reply()),
        RecordingInput::default(),
    );

    h.controller.start().await.unwrap();
    wait_until("iteration 2", || {
        h.sink
            .any(|s| s.iteration == 2 && s.state == LoopState::Running && s.error.is_none())
    })
    .await;
    assert!(h.controller.is_running().await);
    h.controller.stop().await.unwrap();

    let statuses = h.sink.statuses();
    let errors: Vec<_> = statuses.iter().filter(|s| s.error.is_some()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].iteration, 1);
    assert_eq!(errors[0].state, LoopState::Running);
    assert!(errors[0].error.as_deref().unwrap().contains("no frames"));
    assert!(errors[0].actions.is_empty());

    // initial baseline plus the recovery capture
    assert_eq!(h.recorder.fixed(), 2);
    assert_stopped_cleanly(&h);
}

#[tokio::test(start_paused = true)]
async fn fatal_input_error_fails_one_iteration() {
    let h = harness(
        FakeRecorder::default(),
        FakeBackend::replying(click_reply()),
        RecordingInput {
            fatal_on: Some(1),
            ..RecordingInput::default()
        },
    );

    h.controller.start().await.unwrap();
    wait_until("a click after the failure", || !h.input.executed().is_empty()).await;
    h.controller.stop().await.unwrap();

    let statuses = h.sink.statuses();
    let errors: Vec<_> = statuses.iter().filter(|s| s.error.is_some()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].iteration, 1);
    assert!(errors[0].error.as_deref().unwrap().contains("input backend"));

    // the recording that was running when input failed got killed
    assert!(h.recorder.kills() >= 1);
    assert_stopped_cleanly(&h);
}

#[tokio::test(start_paused = true)]
async fn inference_timeout_yields_a_synthetic_result() {
    let config = AppConfig {
        request_timeout_secs: 1,
        ..test_config()
    };
    let h = harness_with(
        config,
        FakeRecorder::default(),
        FakeBackend::replying(click_reply()).hanging(1),
        RecordingInput::default(),
    );

    h.controller.start().await.unwrap();
    wait_until("iteration 2", || h.sink.any(|s| s.iteration == 2)).await;
    h.controller.stop().await.unwrap();

    let statuses = h.sink.statuses();
    let first = statuses
        .iter()
        .find(|s| s.iteration == 1)
        .expect("status for iteration 1");
    assert_eq!(first.reasoning, API_TIMEOUT);
    assert!(first.actions.is_empty());
    assert!(first.error.is_none());
    assert!(statuses.iter().all(|s| s.error.is_none()));
    assert_stopped_cleanly(&h);
}

#[tokio::test(start_paused = true)]
async fn stop_during_inference_kills_the_recording() {
    let config = AppConfig {
        request_timeout_secs: 120,
        ..test_config()
    };
    let h = harness_with(
        config,
        FakeRecorder::default(),
        FakeBackend::replying(click_reply()).hanging(usize::MAX),
        RecordingInput::default(),
    );

    h.controller.start().await.unwrap();
    wait_until("inference in flight", || h.backend.calls() >= 1).await;
    assert_eq!(h.recorder.live(), 1);

    assert!(h.controller.stop().await.unwrap());
    assert_eq!(h.recorder.kills(), 1);
    assert!(h.input.executed().is_empty());

    let pushed = h.sink.len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.sink.len(), pushed, "status pushed after Idle");

    let statuses = h.sink.statuses();
    assert!(!statuses.iter().any(|s| s.iteration == 1 && s.state == LoopState::Running));
    assert_stopped_cleanly(&h);
    assert!(!h.controller.stop().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn nothing_runs_after_stopping_is_announced() {
    let reply = InferenceResult {
        reasoning: "late intent".into(),
        ..click_reply()
    };
    let h = harness_with_sink(
        test_config(),
        FakeRecorder::default(),
        FakeBackend::replying(reply).delayed(Duration::from_millis(500)),
        RecordingInput::default(),
        CollectingSink::stalling_on(LoopState::Stopping, Duration::from_secs(2)),
    );

    h.controller.start().await.unwrap();
    wait_until("inference in flight", || h.backend.calls() >= 1).await;
    assert!(h.controller.stop().await.unwrap());

    let statuses = h.sink.statuses();
    let stopping = statuses
        .iter()
        .position(|s| s.state == LoopState::Stopping)
        .expect("Stopping status");
    assert!(
        statuses[stopping + 1..].iter().all(|s| s.state != LoopState::Running),
        "Running status pushed after Stopping: {statuses:?}"
    );
    assert!(!h.sink.any(|s| s.reasoning == "late intent"));
    assert!(h.input.executed().is_empty());
    assert_eq!(h.recorder.kills(), 1);
    assert_stopped_cleanly(&h);
}

#[tokio::test(start_paused = true)]
async fn baseline_failure_puts_loop_in_error() {
    let h = harness(
        FakeRecorder {
            fail_fixed: true,
            ..FakeRecorder::default()
        },
        FakeBackend::replying(click_reply()),
        RecordingInput::default(),
    );

    h.controller.start().await.unwrap();
    wait_until("error state", || h.sink.any(|s| s.state == LoopState::Error)).await;

    let runtime = h.controller.snapshot().await;
    assert_eq!(runtime.state, LoopState::Error);
    assert!(runtime
        .last_error
        .as_deref()
        .unwrap()
        .contains("initial capture failed"));
    assert_eq!(h.recorder.starts(), 0);
    assert_eq!(h.backend.calls(), 0);

    // a failed loop can be started again
    assert!(h.controller.start().await.unwrap());
    wait_until("second error", || {
        h.sink.statuses().iter().filter(|s| s.state == LoopState::Error).count() == 2
    })
    .await;
    assert!(!h.controller.stop().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn start_is_rejected_while_running_or_without_key() {
    let h = harness(
        FakeRecorder::default(),
        FakeBackend::replying(click_reply()),
        RecordingInput::default(),
    );

    start_loop(&h.controller, &h.config).await.unwrap();
    assert_eq!(
        start_loop(&h.controller, &h.config).await.unwrap_err(),
        ALREADY_RUNNING
    );
    h.controller.stop().await.unwrap();

    let keyless = harness_with(
        AppConfig {
            gemini_api_key: String::new(),
            ..test_config()
        },
        FakeRecorder::default(),
        FakeBackend::replying(click_reply()),
        RecordingInput::default(),
    );
    assert_eq!(
        start_loop(&keyless.controller, &keyless.config)
            .await
            .unwrap_err(),
        NO_API_KEY
    );
    assert_eq!(keyless.sink.len(), 0);
    assert!(!keyless.controller.is_running().await);
}
