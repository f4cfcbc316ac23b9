use crate::models::Action;

pub const MAX_COORD: i32 = 65535;
/// Seconds.
pub const MAX_DURATION: f64 = 5.0;

const NAMED_KEYS: &[&str] = &[
    // modifiers
    "shift", "ctrl", "control", "alt", "option", "cmd", "command",
    // navigation
    "up", "down", "left", "right", "space", "enter", "return", "tab", "escape", "esc",
    "backspace", "delete",
    "insert", "home", "end", "pageup", "pagedown", "capslock", "numlock", "scrolllock",
    "printscreen",
    // punctuation
    "minus", "equals", "comma", "period", "slash", "semicolon", "quote", "backslash",
    "backquote", "bracketleft", "bracketright",
];

/// Whether `key` (already lowercased and trimmed) is one the input
/// backends know how to press.
pub fn is_allowed_key(key: &str) -> bool {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return c.is_ascii_lowercase() || c.is_ascii_digit();
    }
    if let Some(n) = key.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        return (1..=12).contains(&n) && !key[1..].starts_with('0');
    }
    NAMED_KEYS.contains(&key)
}

/// Clamp coordinates and duration into range and drop keys outside the
/// allow-list. Never fails; rejected fields are logged and cleared.
pub fn sanitize(mut action: Action) -> Action {
    action.x = action.x.map(|x| x.clamp(0, MAX_COORD));
    action.y = action.y.map(|y| y.clamp(0, MAX_COORD));
    action.duration = action.duration.map(|d| {
        if d.is_nan() {
            0.0
        } else {
            d.clamp(0.0, MAX_DURATION)
        }
    });
    if let Some(raw) = action.key.take() {
        let key = raw.trim().to_lowercase();
        if is_allowed_key(&key) {
            action.key = Some(key);
        } else {
            log::warn!("Unknown key name '{key}' on {}, skipping", action.kind);
        }
    }
    action
}

pub fn sanitize_all(actions: Vec<Action>) -> Vec<Action> {
    actions.into_iter().map(sanitize).collect()
}
