use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Screen-space rectangle of a window, in real pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl WindowGeometry {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowInfo {
    pub title: String,
    pub geometry: Option<WindowGeometry>,
}

/// What to record. No title and no rectangle means the full screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureWindowSpec {
    pub title: Option<String>,
    pub rect: Option<WindowGeometry>,
}

impl CaptureWindowSpec {
    pub fn full_screen() -> Self {
        Self::default()
    }

    pub fn is_full_screen(&self) -> bool {
        self.title.is_none() && self.rect.is_none()
    }
}

/// A finished recording handed from capture to inference.
#[derive(Clone, PartialEq, Eq)]
pub struct Clip {
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

impl Clip {
    pub fn new(bytes: Vec<u8>, duration: Duration) -> Self {
        Self { bytes, duration }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clip")
            .field("bytes", &self.bytes.len())
            .field("duration", &self.duration)
            .finish()
    }
}
