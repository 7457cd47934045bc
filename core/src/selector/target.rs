use argus_types::Rgb;
use serde::Serialize;
use tokio::time::Instant;

/// Where a monitored entity is in its action cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPhase {
    Idle,
    NeedsAction,
    Acting,
    Cooldown,
}

/// Per-entity selector state. Owned and mutated only by the selector.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
    pub index: usize,
    pub label: String,
    pub last_color: Option<Rgb>,
    pub last_distance: f64,
    /// Larger is worse, see [`crate::ProbeResult::severity`]
    pub severity: f64,
    /// Latest probe result was triggered
    pub needs_action: bool,
    /// Cooldown/rearm expiry
    pub next_available: Option<Instant>,
    pub total_actions: u64,
}

impl TargetState {
    pub(super) fn new(index: usize, label: String) -> Self {
        Self {
            index,
            label,
            last_color: None,
            last_distance: 0.0,
            severity: 0.0,
            needs_action: false,
            next_available: None,
            total_actions: 0,
        }
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.next_available.is_some_and(|at| now < at)
    }

    pub fn is_eligible(&self, now: Instant) -> bool {
        self.needs_action && !self.in_cooldown(now)
    }
}

/// Selector counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectorStats {
    pub sequences: u64,
    /// Sequences that delivered their act input
    pub actions: u64,
    pub preemptions: u64,
    pub failures: u64,
}
