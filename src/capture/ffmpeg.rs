use std::path::Path;
use std::time::Duration;

use crate::models::CaptureWindowSpec;

/// Widest video the encoder produces; wider captures are scaled down.
pub const VIDEO_MAX_WIDTH: u32 = 1280;

/// Capture backend, chosen once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePlatform {
    /// `x11grab` on Linux/BSD desktops.
    X11,
    /// `gdigrab` on Windows.
    GdiGrab,
    /// `avfoundation` on macOS.
    AvFoundation,
}

impl CapturePlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            CapturePlatform::GdiGrab
        } else if cfg!(target_os = "macos") {
            CapturePlatform::AvFoundation
        } else {
            CapturePlatform::X11
        }
    }
}

/// Seconds formatted without trailing zeros, e.g. `1.5`, `2`.
pub fn format_seconds(duration: Duration) -> String {
    let formatted = format!("{:.3}", duration.as_secs_f64());
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn input_args(
    platform: CapturePlatform,
    fps: u32,
    spec: &CaptureWindowSpec,
    display: &str,
) -> Vec<String> {
    let fps_str = fps.to_string();
    let rect = spec.rect.filter(|rect| !rect.is_empty());

    match platform {
        CapturePlatform::GdiGrab => {
            let mut args: Vec<String> = vec![
                "-f".into(),
                "gdigrab".into(),
                "-framerate".into(),
                fps_str,
                "-rtbufsize".into(),
                "100M".into(),
            ];
            // Desktop-region capture goes through the compositor, which has
            // current frames for DirectX/OpenGL windows; `title=` does not.
            if let Some(rect) = rect {
                args.extend([
                    "-offset_x".into(),
                    rect.x.to_string(),
                    "-offset_y".into(),
                    rect.y.to_string(),
                    "-video_size".into(),
                    format!("{}x{}", rect.w, rect.h),
                    "-i".into(),
                    "desktop".into(),
                ]);
            } else if let Some(title) = &spec.title {
                args.extend(["-i".into(), format!("title={title}")]);
            } else {
                args.extend(["-i".into(), "desktop".into()]);
            }
            args
        }
        // avfoundation only accepts native device rates; the output filter
        // downsamples to the requested fps.
        CapturePlatform::AvFoundation => vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            "30".into(),
            "-i".into(),
            "1:none".into(),
        ],
        CapturePlatform::X11 => {
            let mut args: Vec<String> =
                vec!["-f".into(), "x11grab".into(), "-framerate".into(), fps_str];
            if let Some(rect) = rect {
                args.extend([
                    "-video_size".into(),
                    format!("{}x{}", rect.w, rect.h),
                    "-i".into(),
                    format!("{display}+{},{}", rect.x, rect.y),
                ]);
            } else {
                args.extend(["-i".into(), display.to_string()]);
            }
            args
        }
    }
}

/// Encoding arguments. `fragmented` writes the container metadata up front
/// and flushes every keyframe fragment so the file stays playable if the
/// recorder is stopped abruptly.
pub fn output_args(
    platform: CapturePlatform,
    output: &Path,
    fps: u32,
    max_width: u32,
    fragmented: bool,
) -> Vec<String> {
    let mut filters = format!("scale='min({max_width},iw)':-2");
    if platform == CapturePlatform::AvFoundation {
        filters = format!("fps={fps},{filters}");
    }

    let mut args: Vec<String> = vec![
        "-vf".into(),
        filters,
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-crf".into(),
        "30".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ];

    if fragmented {
        // One keyframe per second; x264's default GOP would produce no
        // fragment at all for a clip this short.
        args.extend([
            "-g".into(),
            fps.to_string(),
            "-movflags".into(),
            "frag_keyframe+empty_moov+default_base_moof".into(),
            "-flush_packets".into(),
            "1".into(),
        ]);
    }

    args.push(output.display().to_string());
    args
}

fn preamble() -> Vec<String> {
    // No progress line: it is `\r`-separated and would only grow the stderr tail.
    vec![
        "-y".into(),
        "-nostdin".into(),
        "-hide_banner".into(),
        "-nostats".into(),
    ]
}

/// Open-ended recording that runs until it is signalled to stop.
pub fn session_args(
    platform: CapturePlatform,
    fps: u32,
    spec: &CaptureWindowSpec,
    display: &str,
    output: &Path,
    max_width: u32,
) -> Vec<String> {
    let mut args = preamble();
    args.extend(input_args(platform, fps, spec, display));
    args.extend(output_args(platform, output, fps, max_width, true));
    args
}

/// Recording that ends by itself after `duration`.
pub fn fixed_args(
    platform: CapturePlatform,
    fps: u32,
    spec: &CaptureWindowSpec,
    display: &str,
    output: &Path,
    max_width: u32,
    duration: Duration,
) -> Vec<String> {
    let mut args = preamble();
    args.extend(input_args(platform, fps, spec, display));
    args.extend(["-t".into(), format_seconds(duration)]);
    args.extend(output_args(platform, output, fps, max_width, false));
    args
}

/// Re-encode the last `duration` of `input` into a regular (non-fragmented)
/// file at `output`.
pub fn trim_args(input: &Path, output: &Path, duration: Duration) -> Vec<String> {
    let mut args = preamble();
    args.extend([
        "-sseof".into(),
        format!("-{}", format_seconds(duration)),
        "-i".into(),
        input.display().to_string(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-crf".into(),
        "30".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        output.display().to_string(),
    ]);
    args
}
