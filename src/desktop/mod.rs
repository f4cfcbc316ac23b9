//! Window and screen queries. Calls are blocking; async callers go through
//! `spawn_blocking`.

pub mod x11;

use std::sync::Arc;

use crate::models::{WindowGeometry, WindowInfo};

/// Used when the platform cannot report the screen size.
pub const FALLBACK_SCREEN: (u32, u32) = (1920, 1080);

pub trait WindowQuery: Send + Sync {
    /// Visible top-level windows with non-empty titles, sorted by title.
    fn list_windows(&self) -> anyhow::Result<Vec<WindowInfo>>;

    fn window_geometry(&self, title: &str) -> Option<WindowGeometry>;

    /// Raise and focus the window. `false` if it could not be found.
    fn focus_window(&self, title: &str) -> bool;

    /// Primary screen size in pixels.
    fn screen_size(&self) -> (u32, u32);
}

/// For platforms without a window query backend: no windows, fallback
/// screen size.
#[derive(Debug, Default)]
pub struct NoWindows;

impl WindowQuery for NoWindows {
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
        FALLBACK_SCREEN
    }
}

pub fn platform_windows() -> Arc<dyn WindowQuery> {
    if cfg!(target_os = "linux") {
        Arc::new(x11::XdotoolWindows::new())
    } else {
        log::warn!("Window queries unavailable on this platform, full-screen only");
        Arc::new(NoWindows)
    }
}
