//! Input injection boundary.
//!
//! The engine only needs a boolean "delivered or not" from the backend; how
//! clicks and keys reach the window is up to the [`InputInjector`].

use std::sync::Mutex;

use argus_types::{InputAction, MouseButton, Point};
use async_trait::async_trait;
use tracing::info;

use crate::lock;

/// Opaque native window identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub u64);

impl std::fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickOptions {
    pub button: MouseButton,
    pub double: bool,
}

#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn click(&self, window: WindowHandle, point: Point, options: ClickOptions) -> bool;

    async fn send_key(&self, window: WindowHandle, key: &str) -> bool;
}

/// Deliver a configured input through `injector`.
pub async fn perform(injector: &dyn InputInjector, window: WindowHandle, action: &InputAction) -> bool {
    match action {
        InputAction::Click {
            point,
            button,
            double,
        } => {
            let options = ClickOptions {
                button: *button,
                double: *double,
            };
            injector.click(window, *point, options).await
        }
        InputAction::Key { key } => injector.send_key(window, key).await,
    }
}

/// Logs every input instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunInjector;

#[async_trait]
impl InputInjector for DryRunInjector {
    async fn click(&self, window: WindowHandle, point: Point, options: ClickOptions) -> bool {
        info!(%window, %point, button = ?options.button, double = options.double, "dry-run click");
        true
    }

    async fn send_key(&self, window: WindowHandle, key: &str) -> bool {
        info!(%window, key, "dry-run key");
        true
    }
}

/// What a [`RecordingInjector`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedInput {
    Click { window: WindowHandle, point: Point },
    Key { window: WindowHandle, key: String },
}

/// Records inputs with their (tokio) timestamps; optionally reports failure.
#[derive(Debug, Default)]
pub struct RecordingInjector {
    inputs: Mutex<Vec<(tokio::time::Instant, RecordedInput)>>,
    reject: bool,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// An injector whose every input reports failure.
    pub fn rejecting() -> Self {
        Self {
            inputs: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn inputs(&self) -> Vec<RecordedInput> {
        lock(&self.inputs).iter().map(|(_, i)| i.clone()).collect()
    }

    pub fn timed_inputs(&self) -> Vec<(tokio::time::Instant, RecordedInput)> {
        lock(&self.inputs).clone()
    }

    /// Number of key presses of `key`.
    pub fn key_count(&self, key: &str) -> usize {
        lock(&self.inputs)
            .iter()
            .filter(|(_, i)| matches!(i, RecordedInput::Key { key: k, .. } if k == key))
            .count()
    }

    fn record(&self, input: RecordedInput) -> bool {
        lock(&self.inputs).push((tokio::time::Instant::now(), input));
        !self.reject
    }
}

#[async_trait]
impl InputInjector for RecordingInjector {
    async fn click(&self, window: WindowHandle, point: Point, _options: ClickOptions) -> bool {
        self.record(RecordedInput::Click { window, point })
    }

    async fn send_key(&self, window: WindowHandle, key: &str) -> bool {
        self.record(RecordedInput::Key {
            window,
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn perform_routes_by_kind() {
        let injector = RecordingInjector::new();
        let window = WindowHandle(7);

        assert!(perform(&injector, window, &InputAction::click(10, 20)).await);
        assert!(perform(&injector, window, &InputAction::key("F3")).await);

        assert_eq!(
            injector.inputs(),
            vec![
                RecordedInput::Click {
                    window,
                    point: Point::new(10, 20)
                },
                RecordedInput::Key {
                    window,
                    key: "F3".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn rejecting_injector_still_records() {
        let injector = RecordingInjector::rejecting();
        assert!(!injector.send_key(WindowHandle(1), "1").await);
        assert_eq!(injector.key_count("1"), 1);
    }
}
