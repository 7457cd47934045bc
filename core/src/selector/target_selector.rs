use std::sync::Mutex;
use std::time::Duration;

use argus_types::{InputAction, MemberConfig, SelectorConfig};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::target::{SelectorStats, TargetPhase, TargetState};
use crate::error::ActionError;
use crate::input::{InputInjector, WindowHandle, perform};
use crate::lock;
use crate::probe::ProbeResult;

/// What the selector would do right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Nothing eligible
    Idle,
    /// Animation lock after the previous action
    Locked { until: Instant },
    /// Too soon after the previous sequence start
    Spacing { ready_at: Instant },
    /// Start a sequence on this target
    Act { index: usize },
    /// Keep the in-flight target
    Continue { index: usize },
    /// Switch the in-flight sequence to a much more severe target
    Preempt { from: usize, to: usize },
}

/// Summary of a completed sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub index: usize,
    pub label: String,
    /// The act input, as described by [`InputAction::describe`]
    pub action: String,
    pub preemptions: u32,
}

struct SelectorState {
    targets: Vec<TargetState>,
    acting: Option<usize>,
    last_sequence_start: Option<Instant>,
    animation_lock_until: Option<Instant>,
    stats: SelectorStats,
}

impl SelectorState {
    fn target(&self, index: usize) -> Option<&TargetState> {
        self.targets.iter().find(|t| t.index == index)
    }

    fn target_mut(&mut self, index: usize) -> Option<&mut TargetState> {
        self.targets.iter_mut().find(|t| t.index == index)
    }

    /// Most severe eligible target; ties go to the lower index.
    fn best_candidate(&self, now: Instant, exclude: Option<usize>) -> Option<&TargetState> {
        self.targets
            .iter()
            .filter(|t| Some(t.index) != exclude && t.is_eligible(now))
            .max_by(|a, b| {
                a.severity
                    .total_cmp(&b.severity)
                    .then_with(|| b.index.cmp(&a.index))
            })
    }
}

/// Arbitrates which party member gets the next select/act sequence.
///
/// All check-then-set sequences (eligibility, cooldown, spacing, acting
/// marker) happen under a single lock; the lock is never held across an
/// await.
pub struct TargetSelector {
    client: String,
    config: SelectorConfig,
    members: Vec<MemberConfig>,
    state: Mutex<SelectorState>,
}

impl TargetSelector {
    /// Disabled members and members without a select input are not tracked.
    pub fn new(client: impl Into<String>, config: &SelectorConfig, members: &[MemberConfig]) -> Self {
        let client = client.into();
        let members: Vec<MemberConfig> = members
            .iter()
            .filter(|m| {
                if m.enabled && !m.select.is_configured() {
                    warn!(client = %client, member = %m.label(), "member has no select input, ignoring");
                }
                m.enabled && m.select.is_configured()
            })
            .cloned()
            .collect();

        let targets = members
            .iter()
            .map(|m| TargetState::new(m.index, m.label()))
            .collect();

        Self {
            client,
            config: config.clone(),
            members,
            state: Mutex::new(SelectorState {
                targets,
                acting: None,
                last_sequence_start: None,
                animation_lock_until: None,
                stats: SelectorStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn members(&self) -> &[MemberConfig] {
        &self.members
    }

    fn member(&self, index: usize) -> Option<&MemberConfig> {
        self.members.iter().find(|m| m.index == index)
    }

    /// Feed the latest evaluation of a member's probe. Returns false for
    /// an unknown index.
    pub fn observe(&self, index: usize, result: &ProbeResult) -> bool {
        let mut state = lock(&self.state);
        let Some(target) = state.target_mut(index) else {
            return false;
        };
        target.last_color = Some(result.current_color);
        target.last_distance = result.distance;
        target.severity = result.severity();
        target.needs_action = result.triggered;
        true
    }

    pub fn target(&self, index: usize) -> Option<TargetState> {
        lock(&self.state).target(index).cloned()
    }

    pub fn phase(&self, index: usize, now: Instant) -> Option<TargetPhase> {
        let state = lock(&self.state);
        let target = state.target(index)?;
        let phase = if state.acting == Some(index) {
            TargetPhase::Acting
        } else if target.in_cooldown(now) {
            TargetPhase::Cooldown
        } else if target.needs_action {
            TargetPhase::NeedsAction
        } else {
            TargetPhase::Idle
        };
        Some(phase)
    }

    /// Indices currently eligible, most severe first.
    pub fn eligible(&self, now: Instant) -> Vec<usize> {
        let state = lock(&self.state);
        let mut eligible: Vec<&TargetState> = state
            .targets
            .iter()
            .filter(|t| state.acting != Some(t.index) && t.is_eligible(now))
            .collect();
        eligible.sort_by(|a, b| {
            b.severity
                .total_cmp(&a.severity)
                .then_with(|| a.index.cmp(&b.index))
        });
        eligible.into_iter().map(|t| t.index).collect()
    }

    pub fn stats(&self) -> SelectorStats {
        lock(&self.state).stats
    }

    pub fn decide(&self, now: Instant) -> Decision {
        let state = lock(&self.state);
        self.decide_locked(&state, now)
    }

    fn decide_locked(&self, state: &SelectorState, now: Instant) -> Decision {
        if let Some(until) = state.animation_lock_until
            && now < until
        {
            return Decision::Locked { until };
        }

        if let Some(acting) = state.acting {
            let current = state.target(acting).map_or(0.0, |t| t.severity);
            if let Some(best) = state.best_candidate(now, Some(acting))
                && best.severity - current > self.config.preemption_margin
            {
                return Decision::Preempt {
                    from: acting,
                    to: best.index,
                };
            }
            return Decision::Continue { index: acting };
        }

        let Some(best) = state.best_candidate(now, None) else {
            return Decision::Idle;
        };

        if let Some(last) = state.last_sequence_start {
            let ready_at = last + Duration::from_millis(self.config.min_action_spacing_ms);
            if now < ready_at {
                return Decision::Spacing { ready_at };
            }
        }

        Decision::Act { index: best.index }
    }

    /// Claim the best target if a sequence may start now.
    pub fn try_begin(&self, now: Instant) -> Option<usize> {
        let mut state = lock(&self.state);
        let Decision::Act { index } = self.decide_locked(&state, now) else {
            return None;
        };
        state.acting = Some(index);
        state.last_sequence_start = Some(now);
        state.stats.sequences += 1;
        Some(index)
    }

    fn try_preempt(&self, now: Instant) -> Option<usize> {
        let mut state = lock(&self.state);
        let Decision::Preempt { from, to } = self.decide_locked(&state, now) else {
            return None;
        };
        state.acting = Some(to);
        state.stats.preemptions += 1;
        debug!(client = %self.client, from, to, "preempting target");
        Some(to)
    }

    /// Clear the acting marker and start the target's cooldown and the
    /// global animation lock.
    fn finish(&self, index: usize, success: bool, now: Instant) {
        let mut state = lock(&self.state);
        state.acting = None;
        state.animation_lock_until = Some(now + Duration::from_millis(self.config.animation_delay_ms));
        if success {
            state.stats.actions += 1;
        } else {
            state.stats.failures += 1;
        }
        if let Some(target) = state.target_mut(index) {
            target.next_available = Some(now + Duration::from_millis(self.config.rearm_ms));
            if success {
                target.total_actions += 1;
            }
        }
    }

    fn humanize_delay(&self) -> Duration {
        let min = self.config.humanize_min_ms;
        let max = self.config.humanize_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Run one select → humanize → act sequence if a target is due.
    ///
    /// Returns `Ok(None)` when nothing was eligible. Whatever happens,
    /// including cancellation of this future, the acted-on target ends up
    /// in cooldown and the acting marker is cleared.
    pub async fn run_sequence(
        &self,
        injector: &dyn InputInjector,
        window: WindowHandle,
    ) -> Result<Option<SequenceReport>, ActionError> {
        let Some(first) = self.try_begin(Instant::now()) else {
            return Ok(None);
        };
        let mut guard = SequenceGuard {
            selector: self,
            target: first,
            success: false,
        };
        let mut preemptions = 0u32;

        loop {
            let Some(member) = self.member(guard.target) else {
                return Err(ActionError::Failed(format!("unknown member {}", guard.target)));
            };

            if !perform(injector, window, &member.select).await {
                return Err(rejected(&member.select));
            }

            tokio::time::sleep(self.humanize_delay()).await;

            if preemptions < self.config.max_preemptions
                && let Some(to) = self.try_preempt(Instant::now())
            {
                preemptions += 1;
                guard.target = to;
                continue;
            }

            if !perform(injector, window, &member.act).await {
                return Err(rejected(&member.act));
            }

            guard.success = true;
            let report = SequenceReport {
                index: member.index,
                label: member.label(),
                action: member.act.describe(),
                preemptions,
            };
            debug!(
                client = %self.client,
                target = %report.label,
                action = %report.action,
                preemptions,
                "action executed"
            );
            return Ok(Some(report));
        }
    }
}

fn rejected(action: &InputAction) -> ActionError {
    ActionError::InputRejected {
        input: action.describe(),
    }
}

/// Runs [`TargetSelector::finish`] on every exit path of a sequence.
struct SequenceGuard<'a> {
    selector: &'a TargetSelector,
    target: usize,
    success: bool,
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        self.selector.finish(self.target, self.success, Instant::now());
    }
}
