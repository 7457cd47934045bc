use serde::{Deserialize, Serialize};

/// Client-area coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// A single simulated input sent to a client window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputAction {
    Click {
        #[serde(flatten)]
        point: Point,
        #[serde(default)]
        button: MouseButton,
        #[serde(default)]
        double: bool,
    },
    Key {
        key: String,
    },
}

impl InputAction {
    pub fn click(x: i32, y: i32) -> Self {
        Self::Click {
            point: Point::new(x, y),
            button: MouseButton::Left,
            double: false,
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::Key { key: key.into() }
    }

    /// Short human-readable target: coordinates for clicks, key name for keys.
    pub fn describe(&self) -> String {
        match self {
            Self::Click { point, .. } => point.to_string(),
            Self::Key { key } => key.clone(),
        }
    }

    /// A click at the origin or an empty key name is treated as "not configured".
    pub fn is_configured(&self) -> bool {
        match self {
            Self::Click { point, .. } => point.x > 0 || point.y > 0,
            Self::Key { key } => !key.trim().is_empty(),
        }
    }
}
