//! Per-client frame loop: capture, evaluate probes, dispatch actions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus_types::{ClientConfig, InputAction, ProbeBinding, ProbeConfig};
use hashbrown::HashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::error::{ActionError, ActionResult};
use crate::frame::{Frame, FrameSource};
use crate::input::{InputInjector, WindowHandle, perform};
use crate::lock;
use crate::probe::{self, Debouncer, ProbeResult};
use crate::queue::{PriorityTaskQueue, shutdown_requested};
use crate::scheduler::{ActionScheduler, EventStats};
use crate::selector::{Decision, SelectorStats, TargetSelector};
use crate::signal::{EngineSignal, SignalBus, SkipReason};

/// Frame-loop counters of one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientCounters {
    pub frames: u64,
    /// Capture returned no frame
    pub frames_skipped: u64,
    /// Ticks lost because a cycle overran its period
    pub missed_ticks: u64,
    pub probes_triggered: u64,
    /// Triggers suppressed by a probe's debounce window
    pub debounced: u64,
    /// Probe actions accepted by the event queue
    pub events_dispatched: u64,
    /// Selector sequences accepted by the dispatch queue
    pub sequences_dispatched: u64,
}

/// Snapshot of everything a client has counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub name: String,
    pub counters: ClientCounters,
    pub events: EventStats,
    pub selector: Option<SelectorStats>,
}

/// Deliver one configured input and report it.
async fn deliver(
    injector: Arc<dyn InputInjector>,
    window: WindowHandle,
    action: InputAction,
    signals: SignalBus,
    client: Arc<str>,
    target: String,
) -> ActionResult {
    if !perform(injector.as_ref(), window, &action).await {
        return Err(ActionError::InputRejected {
            input: action.describe(),
        });
    }
    signals.publish(EngineSignal::ActionExecuted {
        client: client.to_string(),
        target,
        action: action.describe(),
        timestamp: Instant::now(),
    });
    Ok(())
}

/// Shared, inspectable parts of a running client.
#[derive(Clone)]
pub(super) struct ClientShared {
    pub name: Arc<str>,
    pub scheduler: Arc<ActionScheduler>,
    pub selector: Option<Arc<TargetSelector>>,
    pub counters: Arc<Mutex<ClientCounters>>,
}

impl ClientShared {
    pub(super) fn stats(&self) -> ClientStats {
        ClientStats {
            name: self.name.to_string(),
            counters: *lock(&self.counters),
            events: self.scheduler.event_stats(),
            selector: self.selector.as_ref().map(|s| s.stats()),
        }
    }
}

pub(super) struct ClientRuntime {
    config: ClientConfig,
    probes: Arc<[ProbeBinding]>,
    window: WindowHandle,
    frames: Arc<dyn FrameSource>,
    injector: Arc<dyn InputInjector>,
    queue: PriorityTaskQueue,
    signals: SignalBus,
    shared: ClientShared,
    /// Previous result per probe name, fed into the next evaluation
    previous: HashMap<String, ProbeResult>,
    debouncer: Debouncer,
}

impl ClientRuntime {
    pub(super) fn new(
        config: ClientConfig,
        frames: Arc<dyn FrameSource>,
        injector: Arc<dyn InputInjector>,
        queue: PriorityTaskQueue,
        signals: SignalBus,
    ) -> Self {
        let name: Arc<str> = config.name.as_str().into();
        let scheduler = Arc::new(ActionScheduler::with_dispatch(
            config.name.clone(),
            &config.scheduler,
            queue.clone(),
        ));
        let selector = (!config.members.is_empty()).then(|| {
            Arc::new(TargetSelector::new(
                config.name.clone(),
                &config.selector,
                &config.members,
            ))
        });

        Self {
            window: WindowHandle(config.window),
            probes: config.probes.clone().into(),
            config,
            frames,
            injector,
            queue,
            signals,
            shared: ClientShared {
                name,
                scheduler,
                selector,
                counters: Arc::new(Mutex::new(ClientCounters::default())),
            },
            previous: HashMap::new(),
            debouncer: Debouncer::new(),
        }
    }

    pub(super) fn shared(&self) -> ClientShared {
        self.shared.clone()
    }

    fn register_periodic(&self) {
        for periodic in self.config.periodic.iter().filter(|p| p.enabled) {
            let injector = Arc::clone(&self.injector);
            let signals = self.signals.clone();
            let client = Arc::clone(&self.shared.name);
            let action = periodic.action.clone();
            let target = periodic.id.clone();
            let window = self.window;

            self.shared.scheduler.schedule_periodic(
                periodic.id.clone(),
                Duration::from_millis(periodic.period_ms),
                periodic.priority,
                move || {
                    deliver(
                        Arc::clone(&injector),
                        window,
                        action.clone(),
                        signals.clone(),
                        Arc::clone(&client),
                        target.clone(),
                    )
                },
            );
        }
    }

    pub(super) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.register_periodic();

        let period = Duration::from_micros(1_000_000 / u64::from(self.config.tick_hz.max(1)));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick: Option<Instant> = None;

        info!(
            client = %self.shared.name,
            window = %self.window,
            tick_hz = self.config.tick_hz,
            probes = self.config.probes.len(),
            members = self.config.members.len(),
            "client loop started"
        );

        loop {
            let tick = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                tick = ticker.tick() => tick,
            };

            if let Some(last) = last_tick {
                self.account_missed_ticks(tick.saturating_duration_since(last), period);
            }
            last_tick = Some(tick);

            self.cycle(Instant::now()).await;
        }

        info!(client = %self.shared.name, "client loop stopped");
    }

    fn account_missed_ticks(&self, gap: Duration, period: Duration) {
        let missed = (gap.as_secs_f64() / period.as_secs_f64()).round() as u64;
        if missed <= 1 {
            return;
        }
        let missed = missed - 1;
        lock(&self.shared.counters).missed_ticks += missed;
        debug!(client = %self.shared.name, missed, "frame loop overran, ticks skipped");
        self.signals.publish(EngineSignal::FrameSkipped {
            client: self.shared.name.to_string(),
            reason: SkipReason::MissedTicks(missed),
            timestamp: Instant::now(),
        });
    }

    async fn cycle(&mut self, now: Instant) {
        let Some(frame) = self.frames.capture(None).await else {
            lock(&self.shared.counters).frames_skipped += 1;
            debug!(client = %self.shared.name, "no frame, skipping cycle");
            self.signals.publish(EngineSignal::FrameSkipped {
                client: self.shared.name.to_string(),
                reason: SkipReason::CaptureFailed,
                timestamp: now,
            });
            return;
        };
        lock(&self.shared.counters).frames += 1;

        let probes = Arc::clone(&self.probes);
        for binding in probes.iter() {
            self.process_binding(binding, &frame, now);
        }

        if self.shared.selector.is_some() {
            self.process_members(&frame, now);
        }
    }

    fn evaluate(&mut self, config: &ProbeConfig, frame: &Frame, now: Instant) -> Option<ProbeResult> {
        let Some(sample) = probe::sample(config, frame) else {
            trace!(client = %self.shared.name, probe = %config.name, "probe outside frame");
            return None;
        };
        let result = probe::evaluate(config, &sample, self.previous.get(&config.name), now);
        self.previous.insert(config.name.clone(), result);
        Some(result)
    }

    fn process_binding(&mut self, binding: &ProbeBinding, frame: &Frame, now: Instant) {
        let probe = &binding.probe;
        let Some(result) = self.evaluate(probe, frame, now) else {
            return;
        };
        if !result.triggered {
            return;
        }

        let window = probe.debounce_ms.map(Duration::from_millis);
        if !self.debouncer.accept(&probe.name, window, now) {
            lock(&self.shared.counters).debounced += 1;
            return;
        }

        lock(&self.shared.counters).probes_triggered += 1;
        debug!(client = %self.shared.name, probe = %probe.name, edge = ?result.edge, "probe triggered");
        self.signals.publish(EngineSignal::ProbeTriggered {
            client: self.shared.name.to_string(),
            probe: probe.name.clone(),
            member: None,
            edge: result.edge,
            timestamp: now,
        });

        let Some(action) = binding.action.clone() else {
            return;
        };
        let injector = Arc::clone(&self.injector);
        let signals = self.signals.clone();
        let client = Arc::clone(&self.shared.name);
        let target = probe.name.clone();
        let window = self.window;

        let accepted = self.shared.scheduler.schedule_event(
            format!("probe:{}", probe.name),
            binding.priority,
            move || deliver(injector, window, action, signals, client, target),
        );
        if accepted {
            lock(&self.shared.counters).events_dispatched += 1;
        }
    }

    fn process_members(&mut self, frame: &Frame, now: Instant) {
        let Some(selector) = self.shared.selector.clone() else {
            return;
        };

        for member in selector.members() {
            let was_triggered = self
                .previous
                .get(&member.probe.name)
                .is_some_and(|r| r.triggered);
            let Some(result) = self.evaluate(&member.probe, frame, now) else {
                continue;
            };
            selector.observe(member.index, &result);

            if result.triggered && !was_triggered {
                lock(&self.shared.counters).probes_triggered += 1;
                self.signals.publish(EngineSignal::ProbeTriggered {
                    client: self.shared.name.to_string(),
                    probe: member.probe.name.clone(),
                    member: Some(member.index),
                    edge: result.edge,
                    timestamp: now,
                });
            }
        }

        if matches!(selector.decide(now), Decision::Act { .. }) {
            self.dispatch_sequence(selector);
        }
    }

    /// At most one sequence per client is pending on the shared queue.
    fn dispatch_sequence(&self, selector: Arc<TargetSelector>) {
        let key = format!("{}/selector", self.shared.name);
        let priority = selector.config().priority;
        let injector = Arc::clone(&self.injector);
        let signals = self.signals.clone();
        let client = self.shared.name.to_string();
        let window = self.window;

        let accepted = self.queue.try_enqueue(key.clone(), priority, Some(&key), move || async move {
            if let Some(report) = selector.run_sequence(injector.as_ref(), window).await? {
                signals.publish(EngineSignal::ActionExecuted {
                    client,
                    target: report.label,
                    action: report.action,
                    timestamp: Instant::now(),
                });
            }
            Ok(())
        });
        if accepted {
            lock(&self.shared.counters).sequences_dispatched += 1;
        }
    }
}
