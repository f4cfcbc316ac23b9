//! The pipelined capture, inference and action loop.

pub mod clips;
pub mod commands;
pub mod controller;
pub mod loop_worker;
pub mod sink;
pub mod state;

use std::sync::Arc;

use crate::actions::InputFactory;
use crate::capture::Recorder;
use crate::desktop::WindowQuery;
use crate::inference::InferenceGateway;
use crate::settings::ConfigStore;

pub use clips::ClipStore;
pub use controller::LoopController;
pub use loop_worker::LoopTiming;
pub use sink::{BroadcastSink, StatusSink};
pub use state::LoopRuntime;

/// Capabilities the loop runs against, chosen once at startup.
#[derive(Clone)]
pub struct LoopServices {
    pub config: ConfigStore,
    pub recorder: Arc<dyn Recorder>,
    pub gateway: InferenceGateway,
    pub windows: Arc<dyn WindowQuery>,
    pub input_factory: InputFactory,
    pub clips: ClipStore,
    pub sink: Arc<dyn StatusSink>,
    pub timing: LoopTiming,
}
