//! Tests for target ranking, preemption, spacing and cooldown handling

use std::time::Duration;

use argus_types::{InputAction, MemberConfig, ProbeConfig, Rgb, SelectorConfig};
use tokio::time::{Instant, sleep};

use super::{Decision, TargetPhase, TargetSelector};
use crate::error::ActionError;
use crate::input::{RecordedInput, RecordingInjector, WindowHandle};
use crate::probe::ProbeResult;

const WINDOW: WindowHandle = WindowHandle(0x1234);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn member(index: usize) -> MemberConfig {
    MemberConfig {
        index,
        name: None,
        enabled: true,
        probe: ProbeConfig::point(
            format!("hp-{index}"),
            20,
            100 + index as u32 * 40,
            Rgb::new(200, 30, 30),
            30.0,
        ),
        select: InputAction::key(format!("F{}", index + 1)),
        act: InputAction::key("1"),
    }
}

fn config() -> SelectorConfig {
    SelectorConfig {
        humanize_min_ms: 50,
        humanize_max_ms: 50,
        ..SelectorConfig::default()
    }
}

fn selector(count: usize) -> TargetSelector {
    selector_with(config(), count)
}

fn selector_with(config: SelectorConfig, count: usize) -> TargetSelector {
    let members: Vec<_> = (0..count).map(member).collect();
    TargetSelector::new("test-client", &config, &members)
}

fn needs_action(severity: f64) -> ProbeResult {
    ProbeResult {
        triggered: true,
        current_color: Rgb::BLACK,
        distance: severity,
        timestamp: Instant::now(),
        edge: None,
        percentage: None,
    }
}

fn healthy() -> ProbeResult {
    ProbeResult {
        triggered: false,
        ..needs_action(0.0)
    }
}

fn key(k: &str) -> RecordedInput {
    RecordedInput::Key {
        window: WINDOW,
        key: k.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ranking
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_most_severe_target_is_chosen_first() {
    let selector = selector(3);
    selector.observe(0, &needs_action(60.0));
    selector.observe(1, &needs_action(70.0));
    selector.observe(2, &needs_action(65.0));

    let now = Instant::now();
    assert_eq!(selector.decide(now), Decision::Act { index: 1 });
    assert_eq!(selector.eligible(now), vec![1, 2, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_equal_severity_goes_to_lower_index() {
    let selector = selector(2);
    selector.observe(1, &needs_action(50.0));
    selector.observe(0, &needs_action(50.0));

    assert_eq!(selector.decide(Instant::now()), Decision::Act { index: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_untriggered_targets_are_idle() {
    let selector = selector(2);
    selector.observe(0, &healthy());

    let now = Instant::now();
    assert_eq!(selector.decide(now), Decision::Idle);
    assert_eq!(selector.phase(0, now), Some(TargetPhase::Idle));
    assert!(!selector.observe(7, &needs_action(90.0)));
}

#[tokio::test(start_paused = true)]
async fn test_disabled_members_are_not_tracked() {
    let mut disabled = member(1);
    disabled.enabled = false;
    let selector = TargetSelector::new("test-client", &config(), &[member(0), disabled]);

    assert!(!selector.observe(1, &needs_action(90.0)));
    assert_eq!(selector.members().len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Preemption
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_much_worse_target_preempts_in_flight_one() {
    let selector = selector(2);
    selector.observe(0, &needs_action(80.0));
    assert_eq!(selector.try_begin(Instant::now()), Some(0));

    selector.observe(1, &needs_action(95.0));
    assert_eq!(
        selector.decide(Instant::now()),
        Decision::Preempt { from: 0, to: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_target_within_margin_does_not_preempt() {
    let selector = selector(2);
    selector.observe(0, &needs_action(80.0));
    assert_eq!(selector.try_begin(Instant::now()), Some(0));

    selector.observe(1, &needs_action(85.0));
    assert_eq!(selector.decide(Instant::now()), Decision::Continue { index: 0 });

    // The lead has to exceed the margin, not just reach it
    selector.observe(1, &needs_action(90.0));
    assert_eq!(selector.decide(Instant::now()), Decision::Continue { index: 0 });
    assert_eq!(selector.phase(0, Instant::now()), Some(TargetPhase::Acting));
}

#[tokio::test(start_paused = true)]
async fn test_sequence_switches_target_after_humanize_delay() {
    let selector = selector(2);
    let injector = RecordingInjector::new();
    selector.observe(0, &needs_action(80.0));

    let (report, ()) = tokio::join!(selector.run_sequence(&injector, WINDOW), async {
        sleep(ms(10)).await;
        selector.observe(1, &needs_action(95.0));
    });

    let report = report.expect("sequence succeeds").expect("a target was due");
    assert_eq!(report.index, 1);
    assert_eq!(report.preemptions, 1);
    assert_eq!(injector.inputs(), vec![key("F1"), key("F2"), key("1")]);

    let now = Instant::now();
    assert_eq!(selector.phase(1, now), Some(TargetPhase::Cooldown));
    assert_eq!(selector.phase(0, now), Some(TargetPhase::NeedsAction));
    assert_eq!(selector.stats().preemptions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_preemption_count_is_bounded() {
    let selector = selector_with(
        SelectorConfig {
            max_preemptions: 0,
            ..config()
        },
        2,
    );
    let injector = RecordingInjector::new();
    selector.observe(0, &needs_action(80.0));

    let (report, ()) = tokio::join!(selector.run_sequence(&injector, WINDOW), async {
        sleep(ms(10)).await;
        selector.observe(1, &needs_action(99.0));
    });

    let report = report.expect("sequence succeeds").expect("a target was due");
    assert_eq!(report.index, 0);
    assert_eq!(injector.inputs(), vec![key("F1"), key("1")]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequences, spacing and cooldown
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_sequence_selects_waits_then_acts() {
    let selector = selector(2);
    let injector = RecordingInjector::new();
    selector.observe(1, &needs_action(50.0));

    let report = selector
        .run_sequence(&injector, WINDOW)
        .await
        .expect("sequence succeeds")
        .expect("a target was due");
    assert_eq!(report.index, 1);
    assert_eq!(report.label, "member-1");
    assert_eq!(report.action, "1");

    let inputs = injector.timed_inputs();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[0].1, key("F2"));
    assert_eq!(inputs[1].1, key("1"));
    assert_eq!(inputs[1].0 - inputs[0].0, ms(50));

    let now = Instant::now();
    assert!(matches!(selector.decide(now), Decision::Locked { .. }));
    assert_eq!(selector.phase(1, now), Some(TargetPhase::Cooldown));
    assert_eq!(selector.target(1).map(|t| t.total_actions), Some(1));
    assert_eq!(selector.stats().actions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_humanize_delay_stays_in_range() {
    let selector = selector_with(
        SelectorConfig {
            humanize_min_ms: 40,
            humanize_max_ms: 90,
            rearm_ms: 0,
            animation_delay_ms: 0,
            min_action_spacing_ms: 0,
            ..SelectorConfig::default()
        },
        1,
    );
    let injector = RecordingInjector::new();

    for _ in 0..20 {
        selector.observe(0, &needs_action(50.0));
        selector
            .run_sequence(&injector, WINDOW)
            .await
            .expect("sequence succeeds");
    }

    let inputs = injector.timed_inputs();
    assert_eq!(inputs.len(), 40);
    for pair in inputs.chunks(2) {
        let delay = pair[1].0 - pair[0].0;
        assert!(delay >= ms(40) && delay <= ms(90), "humanize delay {delay:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_animation_lock_then_next_target() {
    let selector = selector(2);
    let injector = RecordingInjector::new();
    selector.observe(0, &needs_action(40.0));
    selector.observe(1, &needs_action(60.0));

    selector
        .run_sequence(&injector, WINDOW)
        .await
        .expect("sequence succeeds");

    // Finished at +50ms: locked until +300ms, member 1 rearms at +550ms
    sleep(ms(100)).await;
    assert!(matches!(selector.decide(Instant::now()), Decision::Locked { .. }));

    sleep(ms(160)).await;
    assert_eq!(selector.decide(Instant::now()), Decision::Act { index: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_sequence_starts_are_spaced() {
    let selector = selector_with(
        SelectorConfig {
            min_action_spacing_ms: 150,
            animation_delay_ms: 0,
            rearm_ms: 0,
            ..config()
        },
        1,
    );
    let injector = RecordingInjector::new();
    let started = Instant::now();
    selector.observe(0, &needs_action(50.0));

    selector
        .run_sequence(&injector, WINDOW)
        .await
        .expect("sequence succeeds");
    assert_eq!(
        selector.decide(Instant::now()),
        Decision::Spacing {
            ready_at: started + ms(150)
        }
    );
    assert!(selector.run_sequence(&injector, WINDOW).await.expect("no error").is_none());

    sleep(ms(100)).await;
    assert_eq!(selector.decide(Instant::now()), Decision::Act { index: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_rejected_input_still_sets_cooldown() {
    let selector = selector(1);
    let injector = RecordingInjector::rejecting();
    selector.observe(0, &needs_action(70.0));

    let err = selector
        .run_sequence(&injector, WINDOW)
        .await
        .expect_err("injector rejects");
    assert!(matches!(err, ActionError::InputRejected { ref input } if input == "F1"));

    let now = Instant::now();
    assert_eq!(selector.phase(0, now), Some(TargetPhase::Cooldown));
    let stats = selector.stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.actions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_sequence_clears_acting_marker() {
    let selector = selector(1);
    let injector = RecordingInjector::new();
    selector.observe(0, &needs_action(70.0));

    let cancelled =
        tokio::time::timeout(ms(10), selector.run_sequence(&injector, WINDOW)).await;
    assert!(cancelled.is_err());

    let now = Instant::now();
    assert_eq!(selector.phase(0, now), Some(TargetPhase::Cooldown));
    assert_eq!(injector.inputs(), vec![key("F1")]);
    assert_eq!(selector.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_continuous_trigger_acts_once_per_rearm_window() {
    let selector = selector(1);
    let injector = RecordingInjector::new();
    let started = Instant::now();

    while started.elapsed() < ms(2_000) {
        selector.observe(0, &needs_action(70.0));
        selector
            .run_sequence(&injector, WINDOW)
            .await
            .expect("sequence succeeds");
        sleep(ms(10)).await;
    }

    let acts: Vec<Instant> = injector
        .timed_inputs()
        .into_iter()
        .filter(|(_, input)| *input == key("1"))
        .map(|(at, _)| at)
        .collect();
    assert_eq!(acts.len(), 4);
    for pair in acts.windows(2) {
        assert!(pair[1] - pair[0] >= ms(500), "acts {:?} apart", pair[1] - pair[0]);
    }
}
