use async_trait::async_trait;
use std::{io::ErrorKind, process::Stdio, time::Duration};
use tokio::{process::Command, time::timeout};

use super::executor::{InputBackend, InputError};
use crate::capture::ffmpeg::format_seconds;
use crate::models::{Action, ActionKind, MouseButton};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PRESS_HOLD: f64 = 0.05;

/// X11 input through the `xdotool` binary.
pub struct XdotoolBackend {
    bin: String,
}

impl XdotoolBackend {
    pub fn new() -> Self {
        Self::with_binary("xdotool")
    }

    pub fn with_binary(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, kind: ActionKind, args: Vec<String>, hold: Duration) -> Result<(), InputError> {
        let run = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let out = match timeout(COMMAND_TIMEOUT + hold, run).await {
            Err(_) => return Err(InputError::action(kind, "xdotool timed out")),
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                return Err(InputError::Fatal(format!("{} not found on PATH", self.bin)))
            }
            Ok(Err(err)) => return Err(InputError::action(kind, err.to_string())),
            Ok(Ok(out)) => out,
        };

        if out.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr);
            Err(InputError::action(
                kind,
                format!("xdotool exited with {}: {}", out.status, stderr.trim()),
            ))
        }
    }
}

impl Default for XdotoolBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputBackend for XdotoolBackend {
    fn name(&self) -> &'static str {
        "xdotool"
    }

    async fn execute(&self, action: &Action) -> Result<(), InputError> {
        if action.kind == ActionKind::Wait {
            if let Some(seconds) = action.duration.filter(|d| *d > 0.0) {
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            }
            return Ok(());
        }

        let Some(args) = command_args(action) else {
            log::debug!("Nothing to do for {}", action.describe());
            return Ok(());
        };
        let hold = match action.kind {
            ActionKind::KeyPress => press_hold(action),
            _ => Duration::ZERO,
        };
        self.run(action.kind, args, hold).await
    }
}

fn press_hold(action: &Action) -> Duration {
    Duration::from_secs_f64(action.duration.unwrap_or(DEFAULT_PRESS_HOLD).max(0.0))
}

fn button_number(button: Option<MouseButton>) -> &'static str {
    match button.unwrap_or_default() {
        MouseButton::Left => "1",
        MouseButton::Middle => "2",
        MouseButton::Right => "3",
    }
}

/// X keysym for an allow-listed key name.
pub fn keysym(key: &str) -> Option<String> {
    let mapped = match key {
        "shift" => "shift",
        "ctrl" | "control" => "ctrl",
        "alt" | "option" => "alt",
        "cmd" | "command" => "super",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "space" => "space",
        "enter" | "return" => "Return",
        "tab" => "Tab",
        "escape" | "esc" => "Escape",
        "backspace" => "BackSpace",
        "delete" => "Delete",
        "insert" => "Insert",
        "home" => "Home",
        "end" => "End",
        "pageup" => "Page_Up",
        "pagedown" => "Page_Down",
        "capslock" => "Caps_Lock",
        "numlock" => "Num_Lock",
        "scrolllock" => "Scroll_Lock",
        "printscreen" => "Print",
        "minus" => "minus",
        "equals" => "equal",
        "comma" => "comma",
        "period" => "period",
        "slash" => "slash",
        "semicolon" => "semicolon",
        "quote" => "apostrophe",
        "backslash" => "backslash",
        "backquote" => "grave",
        "bracketleft" => "bracketleft",
        "bracketright" => "bracketright",
        f if f.len() > 1 && f.starts_with('f') && f[1..].parse::<u8>().is_ok() => {
            return Some(f.to_uppercase());
        }
        single if single.chars().count() == 1 => return Some(single.to_string()),
        _ => return None,
    };
    Some(mapped.to_string())
}

/// `xdotool` arguments for `action`, or `None` when it has nothing to act on
/// (e.g. a key action whose key was rejected).
pub fn command_args(action: &Action) -> Option<Vec<String>> {
    let key = || action.key.as_deref().and_then(keysym);
    let args: Vec<String> = match action.kind {
        ActionKind::KeyPress => {
            let key = key()?;
            vec![
                "keydown".into(),
                key.clone(),
                "sleep".into(),
                format_seconds(press_hold(action)),
                "keyup".into(),
                key,
            ]
        }
        ActionKind::KeyDown => vec!["keydown".into(), key()?],
        ActionKind::KeyUp => vec!["keyup".into(), key()?],
        ActionKind::MouseMove => {
            if action.dx.is_some() || action.dy.is_some() {
                vec![
                    "mousemove_relative".into(),
                    "--".into(),
                    action.dx.unwrap_or(0).to_string(),
                    action.dy.unwrap_or(0).to_string(),
                ]
            } else {
                let (x, y) = action.x.zip(action.y)?;
                vec!["mousemove".into(), x.to_string(), y.to_string()]
            }
        }
        ActionKind::MouseClick => {
            let mut args = Vec::new();
            if let Some((x, y)) = action.x.zip(action.y) {
                args.extend(["mousemove".into(), x.to_string(), y.to_string()]);
            }
            args.extend(["click".into(), button_number(action.button).into()]);
            args
        }
        ActionKind::MouseDown => vec!["mousedown".into(), button_number(action.button).into()],
        ActionKind::MouseUp => vec!["mouseup".into(), button_number(action.button).into()],
        ActionKind::Wait => return None,
    };
    Some(args)
}
