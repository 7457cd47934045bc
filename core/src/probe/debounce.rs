use std::time::Duration;

use hashbrown::HashMap;
use tokio::time::Instant;

/// Suppresses re-triggering of the same probe within its debounce window.
///
/// Keyed by probe name; owned by the per-client loop.
#[derive(Debug, Default)]
pub struct Debouncer {
    last_accepted: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and accept a trigger unless one was accepted less than
    /// `window` ago. A missing window accepts everything.
    pub fn accept(&mut self, probe: &str, window: Option<Duration>, now: Instant) -> bool {
        if let Some(window) = window
            && let Some(last) = self.last_accepted.get(probe)
            && now.saturating_duration_since(*last) < window
        {
            return false;
        }
        self.last_accepted.insert(probe.to_string(), now);
        true
    }

    pub fn reset(&mut self) {
        self.last_accepted.clear();
    }
}
