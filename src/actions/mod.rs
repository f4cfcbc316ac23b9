//! Turning model output into input: bbox mapping, sanitizing, and the
//! platform backends that press the keys.

pub mod dry_run;
pub mod executor;
pub mod mapper;
pub mod sanitize;
pub mod xdotool;

use std::sync::Arc;

pub use dry_run::DryRunBackend;
pub use executor::{execute_actions, InputBackend, InputError};
pub use mapper::{map_bbox, scale_actions, ScreenInfo};
pub use sanitize::{sanitize, sanitize_all, MAX_COORD, MAX_DURATION};
pub use xdotool::XdotoolBackend;

/// Builds the input backend when a loop starts.
pub type InputFactory = Arc<dyn Fn() -> Arc<dyn InputBackend> + Send + Sync>;

/// Backend for this platform: `xdotool` on Linux, the logging backend when
/// `dry_run` is set or nothing else is available.
pub fn platform_input(dry_run: bool) -> Arc<dyn InputBackend> {
    if dry_run {
        return Arc::new(DryRunBackend);
    }
    if cfg!(target_os = "linux") {
        Arc::new(XdotoolBackend::new())
    } else {
        log::warn!("No input backend for this platform, actions will only be logged");
        Arc::new(DryRunBackend)
    }
}

pub fn platform_input_factory(dry_run: bool) -> InputFactory {
    Arc::new(move || platform_input(dry_run))
}
