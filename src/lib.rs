pub mod actions;
pub mod capture;
pub mod desktop;
pub mod game_loop;
pub mod hotkey;
pub mod inference;
pub mod models;
pub mod server;
pub mod settings;
pub mod utils;

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use capture::{CaptureSettings, FfmpegRecorder};
use desktop::WindowQuery;
use game_loop::{BroadcastSink, ClipStore, LoopController, LoopServices, LoopTiming};
use inference::{GeminiBackend, InferenceGateway, ReasoningBackend};
use settings::ConfigStore;

/// Shared by every HTTP and WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: LoopController,
    pub config: ConfigStore,
    pub windows: Arc<dyn WindowQuery>,
    pub clips: ClipStore,
    pub statuses: BroadcastSink,
}

impl AppState {
    pub fn new(controller: LoopController, statuses: BroadcastSink) -> Self {
        let services = controller.services();
        Self {
            config: services.config.clone(),
            windows: Arc::clone(&services.windows),
            clips: services.clips.clone(),
            controller,
            statuses,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "playerai")]
#[command(about = "Plays a game by recording the screen, asking a vision model, and pressing keys")]
#[command(version)]
pub struct RunOptions {
    /// Address to bind the HTTP/WebSocket server to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Where per-iteration debug clips are written
    #[arg(long, default_value = "temp")]
    pub clips_dir: PathBuf,

    /// Persisted settings (the API key is never written here)
    #[arg(long, default_value = "settings.json")]
    pub settings: PathBuf,

    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg_bin: PathBuf,

    /// Log actions instead of sending input
    #[arg(long)]
    pub dry_run: bool,

    /// Override the Gemini API base URL
    #[arg(long)]
    pub gemini_base_url: Option<String>,
}

pub fn run(options: RunOptions) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            warn!("Ignoring unreadable .env: {err}");
        }
    }

    info!("playerai starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(serve_app(options))
}

async fn serve_app(options: RunOptions) -> Result<()> {
    let config = ConfigStore::load(options.settings.clone())?;
    if !config.snapshot().has_api_key() {
        warn!("GEMINI_API_KEY is not set; start will be rejected until a key is configured");
    }

    let capture = CaptureSettings {
        ffmpeg_bin: options.ffmpeg_bin.clone(),
        ..CaptureSettings::default()
    };
    let backend: Arc<dyn ReasoningBackend> = match &options.gemini_base_url {
        Some(url) => Arc::new(GeminiBackend::with_base_url(url.as_str())),
        None => Arc::new(GeminiBackend::new()),
    };
    let statuses = BroadcastSink::new(64);

    let services = LoopServices {
        config,
        recorder: Arc::new(FfmpegRecorder::new(capture)),
        gateway: InferenceGateway::new(backend),
        windows: desktop::platform_windows(),
        input_factory: actions::platform_input_factory(options.dry_run),
        clips: ClipStore::new(options.clips_dir.clone()),
        sink: Arc::new(statuses.clone()),
        timing: LoopTiming::default(),
    };
    let controller = LoopController::new(services);

    hotkey::spawn_emergency_stop(controller.clone());

    let shutdown = {
        let controller = controller.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received, shutting down");
            if let Err(err) = controller.stop().await {
                error!("Failed to stop loop on shutdown: {err:#}");
            }
        }
    };

    let state = AppState::new(controller, statuses);
    let addr = SocketAddr::new(options.host, options.port);
    server::serve(state, addr, shutdown).await
}
