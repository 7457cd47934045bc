//! Configuration loading, saving and validation
//!
//! The whole session is described by one TOML document ([`AppConfig`]).
//! [`validate`] runs before any client starts and reports every problem at
//! once, so the operator can fix a file in one pass.

use std::fs;
use std::path::{Path, PathBuf};

use argus_types::{
    AppConfig, ClientConfig, InputAction, MAX_CLIENTS, MemberConfig, PeriodicActionConfig,
    Priority, ProbeBinding, ProbeConfig, ProbeGeometry, ProbeMode, Rgb,
};
use hashbrown::HashSet;

use crate::error::{ConfigError, ValidationIssue};

/// Load a configuration file. The result is not validated.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save a configuration, creating parent directories as needed.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let contents = toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(path, contents).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// `<config dir>/argus/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("argus").join("config.toml"))
}

// ═══════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            location: location.into(),
            message: message.into(),
        });
    }
}

/// Check a configuration before any client starts. Disabled clients,
/// members and periodic actions are not checked.
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let mut issues = Issues::default();

    if config.queue.max_queue_size == 0 {
        issues.push("queue", "max_queue_size must be at least 1");
    }
    if config.queue.max_concurrency == 0 {
        issues.push("queue", "max_concurrency must be at least 1");
    }

    let clients: Vec<&ClientConfig> = config.enabled_clients().collect();
    if clients.is_empty() {
        issues.push("config", "no enabled clients");
    }
    if clients.len() > MAX_CLIENTS {
        issues.push(
            "config",
            format!("{} enabled clients, at most {MAX_CLIENTS} are supported", clients.len()),
        );
    }

    let mut client_names = HashSet::new();
    for client in clients {
        let loc = format!("client[{}]", client.name);
        if !client_names.insert(client.name.as_str()) {
            issues.push(&loc, "duplicate client name");
        }
        validate_client(&loc, client, &mut issues);
    }

    if issues.0.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(issues.0))
    }
}

fn validate_client(loc: &str, client: &ClientConfig, issues: &mut Issues) {
    if client.tick_hz == 0 {
        issues.push(loc, "tick_hz must be at least 1");
    }
    if client.scheduler.max_pending_events == 0 {
        issues.push(format!("{loc}.scheduler"), "max_pending_events must be at least 1");
    }

    let selector = &client.selector;
    if selector.humanize_min_ms > selector.humanize_max_ms {
        issues.push(
            format!("{loc}.selector"),
            format!(
                "humanize_min_ms ({}) exceeds humanize_max_ms ({})",
                selector.humanize_min_ms, selector.humanize_max_ms
            ),
        );
    }
    if !(selector.preemption_margin >= 0.0) {
        issues.push(format!("{loc}.selector"), "preemption_margin must be non-negative");
    }

    // Probe names key per-probe state, so they must be unique across
    // standalone probes and member probes alike
    let mut probe_names = HashSet::new();
    for binding in &client.probes {
        let probe_loc = format!("{loc}.probe[{}]", binding.probe.name);
        if !probe_names.insert(binding.probe.name.as_str()) {
            issues.push(&probe_loc, "duplicate probe name");
        }
        validate_binding(&probe_loc, binding, issues);
    }

    let mut indices = HashSet::new();
    for member in client.members.iter().filter(|m| m.enabled) {
        let member_loc = format!("{loc}.member[{}]", member.index);
        if !indices.insert(member.index) {
            issues.push(&member_loc, "duplicate member index");
        }
        if !probe_names.insert(member.probe.name.as_str()) {
            issues.push(&member_loc, format!("duplicate probe name '{}'", member.probe.name));
        }
        validate_member(&member_loc, member, issues);
    }

    let mut periodic_ids = HashSet::new();
    for periodic in client.periodic.iter().filter(|p| p.enabled) {
        let periodic_loc = format!("{loc}.periodic[{}]", periodic.id);
        if !periodic_ids.insert(periodic.id.as_str()) {
            issues.push(&periodic_loc, "duplicate periodic id");
        }
        validate_periodic(&periodic_loc, periodic, issues);
    }
}

fn validate_probe(loc: &str, probe: &ProbeConfig, issues: &mut Issues) {
    if probe.name.trim().is_empty() {
        issues.push(loc, "probe name is empty");
    }
    if !(probe.tolerance >= 0.0) {
        issues.push(loc, format!("tolerance must be non-negative, got {}", probe.tolerance));
    }
    if let ProbeGeometry::Bar {
        start_x,
        end_x,
        monitor_percentage,
        ..
    } = probe.geometry
    {
        if start_x >= end_x {
            issues.push(loc, format!("bar start_x ({start_x}) must be left of end_x ({end_x})"));
        }
        if !(0.0..=100.0).contains(&monitor_percentage) {
            issues.push(
                loc,
                format!("monitor_percentage must be within [0, 100], got {monitor_percentage}"),
            );
        }
    }
}

fn validate_binding(loc: &str, binding: &ProbeBinding, issues: &mut Issues) {
    validate_probe(loc, &binding.probe, issues);
    if let Some(action) = &binding.action
        && !action.is_configured()
    {
        issues.push(loc, "action has no coordinates or key configured");
    }
}

fn validate_member(loc: &str, member: &MemberConfig, issues: &mut Issues) {
    let probe_loc = format!("{loc}.probe");
    validate_probe(&probe_loc, &member.probe, issues);
    // Member triggers are paced by the selector, never by the debouncer
    if member.probe.debounce_ms.is_some() {
        issues.push(&probe_loc, "debounce_ms is not supported on member probes, use selector.rearm_ms");
    }
    if !member.select.is_configured() {
        issues.push(loc, "enabled member has no select coordinates or key configured");
    }
    if !member.act.is_configured() {
        issues.push(loc, "enabled member has no act coordinates or key configured");
    }
}

fn validate_periodic(loc: &str, periodic: &PeriodicActionConfig, issues: &mut Issues) {
    if periodic.period_ms == 0 {
        issues.push(loc, "period_ms must be at least 1");
    }
    if !periodic.action.is_configured() {
        issues.push(loc, "action has no coordinates or key configured");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Sample
// ═══════════════════════════════════════════════════════════════════════════

const EMPTY_BAR: Rgb = Rgb::new(40, 40, 40);

/// A small but complete configuration to start from.
pub fn sample_config() -> AppConfig {
    let members = (0..2)
        .map(|index| {
            let y = 120 + index as u32 * 48;
            MemberConfig {
                index,
                name: Some(format!("party-{}", index + 1)),
                enabled: true,
                // Level mode on the empty color: triggered once health drops below 60%
                probe: ProbeConfig::bar(format!("party-{}-hp", index + 1), 40, 200, y, 60.0, EMPTY_BAR, 30.0),
                select: InputAction::key(format!("F{}", index + 2)),
                act: InputAction::key("1"),
            }
        })
        .collect();

    let client = ClientConfig {
        name: "main".to_string(),
        window: 0,
        enabled: true,
        tick_hz: 20,
        probes: vec![
            ProbeBinding {
                probe: ProbeConfig::point("skill-ready", 620, 540, Rgb::new(250, 210, 60), 25.0)
                    .with_mode(ProbeMode::Edge)
                    .with_debounce_ms(500),
                action: Some(InputAction::key("2")),
                priority: Priority::Normal,
            },
            ProbeBinding {
                probe: ProbeConfig::bar("self-mana", 40, 200, 60, 20.0, EMPTY_BAR, 30.0)
                    .with_debounce_ms(5_000),
                action: Some(InputAction::key("F12")),
                priority: Priority::Low,
            },
        ],
        periodic: vec![PeriodicActionConfig {
            id: "buff".to_string(),
            enabled: true,
            period_ms: 30_000,
            priority: Priority::Maintenance,
            action: InputAction::key("3"),
        }],
        members,
        selector: Default::default(),
        scheduler: Default::default(),
    };

    AppConfig {
        clients: vec![client],
        ..AppConfig::default()
    }
}
