pub mod action;
pub mod capture;
pub mod inference;
pub mod status;

pub use action::{Action, ActionKind, MouseButton};
pub use capture::{CaptureWindowSpec, Clip, WindowGeometry, WindowInfo};
pub use inference::InferenceResult;
pub use status::{LoopState, LoopStatus};
