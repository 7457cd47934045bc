//! Session configuration: clients, their probes, periodic actions and party members.
//!
//! Loaded once at startup and treated as immutable while the engine runs.

use serde::{Deserialize, Serialize};

use crate::input::InputAction;
use crate::priority::Priority;
use crate::probe::ProbeConfig;

/// Maximum number of simultaneously driven clients.
pub const MAX_CLIENTS: usize = 8;

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine-wide settings
// ═══════════════════════════════════════════════════════════════════════════

/// Shared dispatch pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Cap on the sum of all priority sub-queues
    pub max_queue_size: usize,
    /// Number of concurrent workers draining the queue
    pub max_concurrency: usize,
    /// Per-task execution timeout
    pub task_timeout_ms: u64,
    /// Executions slower than this are logged as warnings
    pub slow_task_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 256,
            max_concurrency: 4,
            task_timeout_ms: 30_000,
            slow_task_ms: 1_000,
        }
    }
}

/// Per-client periodic/event scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Events with the same id enqueued closer together than this are dropped
    pub event_throttle_ms: u64,
    /// Periodic loops further behind than this resynchronise instead of bursting
    pub max_lag_ms: u64,
    /// Bound on pending event-driven actions
    pub max_pending_events: usize,
    pub task_timeout_ms: u64,
    pub slow_task_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            event_throttle_ms: 20,
            max_lag_ms: 100,
            max_pending_events: 128,
            task_timeout_ms: 30_000,
            slow_task_ms: 1_000,
        }
    }
}

/// Target selection timing and preemption policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Severity lead a new target needs to take over an in-flight one
    pub preemption_margin: f64,
    /// Minimum time between the start of two action sequences
    pub min_action_spacing_ms: u64,
    pub humanize_min_ms: u64,
    pub humanize_max_ms: u64,
    /// Per-target cooldown after being acted upon
    pub rearm_ms: u64,
    /// Global lock after an action while the in-game effect animates
    pub animation_delay_ms: u64,
    /// Bound on target switches within one sequence
    pub max_preemptions: u32,
    /// Priority of selector sequences on the shared dispatch queue
    pub priority: Priority,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            preemption_margin: 10.0,
            min_action_spacing_ms: 150,
            humanize_min_ms: 40,
            humanize_max_ms: 90,
            rearm_ms: 500,
            animation_delay_ms: 250,
            max_preemptions: 2,
            priority: Priority::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Per-client definitions
// ═══════════════════════════════════════════════════════════════════════════

/// A probe plus the input fired when it triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeBinding {
    #[serde(flatten)]
    pub probe: ProbeConfig,

    /// Input sent when the probe triggers (None = telemetry only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<InputAction>,

    #[serde(default)]
    pub priority: Priority,
}

/// Fixed-rate input, e.g. a buff refresh or loot key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicActionConfig {
    pub id: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub period_ms: u64,

    #[serde(default)]
    pub priority: Priority,

    pub action: InputAction,
}

/// A party member watched by the target selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Health probe; triggered means the member needs action
    pub probe: ProbeConfig,

    /// Input that makes this member the current target
    pub select: InputAction,

    /// Input applied to the selected member
    pub act: InputAction,
}

impl MemberConfig {
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("member-{}", self.index))
    }
}

/// One monitored game window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub name: String,

    /// Native window handle; 0 lets the input backend pick the foreground window
    #[serde(default)]
    pub window: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sampling rate of the frame loop
    pub tick_hz: u32,

    #[serde(default, rename = "probe")]
    pub probes: Vec<ProbeBinding>,

    #[serde(default, rename = "periodic")]
    pub periodic: Vec<PeriodicActionConfig>,

    #[serde(default, rename = "member")]
    pub members: Vec<MemberConfig>,

    #[serde(default)]
    pub selector: SelectorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub queue: QueueConfig,

    /// Interval of the queue statistics summary
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    #[serde(default, rename = "client")]
    pub clients: Vec<ClientConfig>,
}

fn default_stats_interval_ms() -> u64 {
    10_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            stats_interval_ms: default_stats_interval_ms(),
            clients: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn enabled_clients(&self) -> impl Iterator<Item = &ClientConfig> {
        self.clients.iter().filter(|c| c.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColorMetric, MouseButton, Point, ProbeGeometry, ProbeMode, Rgb};

    #[test]
    fn test_parse_client_toml() {
        let toml = r#"
stats_interval_ms = 5000

[queue]
max_queue_size = 64

[[client]]
name = "main"
window = 4242
tick_hz = 20

[[client.probe]]
name = "skill_ready"
kind = "point"
x = 100
y = 200
radius = 1
mode = "edge"
metric = "hsv"
color = [255, 200, 0]
tolerance = 12.5
debounce_ms = 300
priority = "high"
action = { type = "key", key = "F1" }

[[client.probe]]
name = "mana"
kind = "bar"
start_x = 10
end_x = 110
y = 40
monitor_percentage = 30.0
color = [0, 0, 255]
tolerance = 40.0

[[client.periodic]]
id = "loot"
period_ms = 1500
priority = "low"
action = { type = "click", x = 5, y = 6, button = "right" }

[[client.member]]
index = 1
name = "Tank"
probe = { name = "tank_hp", kind = "bar", start_x = 0, end_x = 100, y = 5, monitor_percentage = 50.0, color = [40, 40, 40], tolerance = 20.0 }
select = { type = "key", key = "F2" }
act = { type = "key", key = "3" }

[client.selector]
rearm_ms = 800
"#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.stats_interval_ms, 5000);
        assert_eq!(config.queue.max_queue_size, 64);
        assert_eq!(config.queue.max_concurrency, 4);

        let client = &config.clients[0];
        assert_eq!(client.window, 4242);
        assert!(client.enabled);
        assert_eq!(client.probes.len(), 2);

        let skill = &client.probes[0];
        assert_eq!(skill.probe.mode, ProbeMode::Edge);
        assert_eq!(skill.probe.metric, ColorMetric::Hsv);
        assert_eq!(skill.probe.color, Rgb::new(255, 200, 0));
        assert_eq!(skill.probe.debounce_ms, Some(300));
        assert_eq!(skill.priority, Priority::High);
        assert_eq!(skill.action, Some(InputAction::key("F1")));
        assert_eq!(
            skill.probe.geometry,
            ProbeGeometry::Point {
                x: 100,
                y: 200,
                radius: 1
            }
        );

        let mana = &client.probes[1];
        assert!(mana.probe.is_bar());
        assert_eq!(mana.probe.mode, ProbeMode::Level);
        assert_eq!(mana.priority, Priority::Normal);

        let loot = &client.periodic[0];
        assert_eq!(
            loot.action,
            InputAction::Click {
                point: Point::new(5, 6),
                button: MouseButton::Right,
                double: false,
            }
        );

        assert_eq!(client.members[0].label(), "Tank");
        assert_eq!(client.selector.rearm_ms, 800);
        assert_eq!(client.selector.preemption_margin, 10.0);
        assert_eq!(client.scheduler.event_throttle_ms, 20);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = AppConfig::default();
        config.clients.push(ClientConfig {
            name: "alt".to_string(),
            window: 0,
            enabled: false,
            tick_hz: 10,
            probes: vec![],
            periodic: vec![],
            members: vec![],
            selector: SelectorConfig::default(),
            scheduler: SchedulerConfig::default(),
        });

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.enabled_clients().count(), 0);
    }

    #[test]
    fn unconfigured_inputs_are_detected() {
        assert!(!InputAction::click(0, 0).is_configured());
        assert!(!InputAction::key("  ").is_configured());
        assert!(InputAction::click(3, 0).is_configured());
        assert!(InputAction::key("F1").is_configured());
    }
}
