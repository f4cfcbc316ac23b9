use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    KeyPress,
    KeyDown,
    KeyUp,
    MouseMove,
    MouseClick,
    MouseDown,
    MouseUp,
    Wait,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::KeyPress => "key_press",
            ActionKind::KeyDown => "key_down",
            ActionKind::KeyUp => "key_up",
            ActionKind::MouseMove => "mouse_move",
            ActionKind::MouseClick => "mouse_click",
            ActionKind::MouseDown => "mouse_down",
            ActionKind::MouseUp => "mouse_up",
            ActionKind::Wait => "wait",
        }
    }

    pub fn is_mouse(&self) -> bool {
        matches!(
            self,
            ActionKind::MouseMove
                | ActionKind::MouseClick
                | ActionKind::MouseDown
                | ActionKind::MouseUp
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// A single input action proposed by the reasoning service.
///
/// The wire shape is flat: `action` names the variant and the remaining
/// fields are populated as that variant needs them. `x`/`y` are never
/// trusted from the service; they are filled from `bbox` by the coordinate
/// mapper before execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// `[y_min, x_min, y_max, x_max]` on a 0-1000 scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dx: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            key: None,
            bbox: None,
            x: None,
            y: None,
            dx: None,
            dy: None,
            button: None,
            duration: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_bbox(mut self, bbox: [i32; 4]) -> Self {
        self.bbox = Some(bbox.to_vec());
        self
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = Some(button);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Compact form used when feeding the previous turn back to the model,
    /// e.g. `key_press(key=w)` or `mouse_click(bbox=[1, 2, 3, 4])`.
    pub fn describe(&self) -> String {
        let mut desc = self.kind.as_str().to_string();
        if let Some(key) = &self.key {
            desc.push_str(&format!("(key={key})"));
        } else if let Some(bbox) = &self.bbox {
            let parts: Vec<String> = bbox.iter().map(|v| v.to_string()).collect();
            desc.push_str(&format!("(bbox=[{}])", parts.join(", ")));
        } else if let Some(button) = &self.button {
            desc.push_str(&format!("(button={})", button.as_str()));
        }
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_flat_wire_shape() {
        let raw = r#"{"action":"mouse_click","bbox":[400,400,600,600],"button":"right"}"#;
        let action: Action = serde_json::from_str(raw).unwrap();
        assert_eq!(action.kind, ActionKind::MouseClick);
        assert_eq!(action.bbox, Some(vec![400, 400, 600, 600]));
        assert_eq!(action.button, Some(MouseButton::Right));
        assert!(action.x.is_none());
    }

    #[test]
    fn describe_prefers_key_then_bbox_then_button() {
        assert_eq!(
            Action::new(ActionKind::KeyPress).with_key("w").describe(),
            "key_press(key=w)"
        );
        assert_eq!(
            Action::new(ActionKind::MouseMove)
                .with_bbox([1, 2, 3, 4])
                .with_button(MouseButton::Left)
                .describe(),
            "mouse_move(bbox=[1, 2, 3, 4])"
        );
        assert_eq!(
            Action::new(ActionKind::MouseUp)
                .with_button(MouseButton::Middle)
                .describe(),
            "mouse_up(button=middle)"
        );
        assert_eq!(Action::new(ActionKind::Wait).describe(), "wait");
    }
}
