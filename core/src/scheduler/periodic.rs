//! Drift-corrected periodic and one-shot task loops.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus_types::Priority;
use hashbrown::HashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::lock;
use crate::queue::{ActionFuture, ExecutionLimits, Outcome, PriorityTaskQueue, WorkFactory};
use crate::queue::{run_guarded, shutdown_requested};

/// Periodic action body, invoked once per tick.
pub type RepeatingAction = Arc<dyn Fn() -> ActionFuture + Send + Sync + 'static>;

/// Running statistics of one periodic or one-shot task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodicTaskStats {
    pub period: Duration,
    pub priority: Priority,
    /// Includes failed executions
    pub executions: u64,
    pub failures: u64,
    /// Times the loop fell behind and re-anchored its deadline to now
    pub resyncs: u64,
    pub last_duration: Option<Duration>,
    pub max_duration: Duration,
    pub next_deadline: Option<Instant>,
    total_duration: Duration,
}

impl PeriodicTaskStats {
    fn new(period: Duration, priority: Priority) -> Self {
        Self {
            period,
            priority,
            ..Self::default()
        }
    }

    fn record(&mut self, elapsed: Duration, success: bool) {
        self.executions += 1;
        if !success {
            self.failures += 1;
        }
        self.last_duration = Some(elapsed);
        self.max_duration = self.max_duration.max(elapsed);
        self.total_duration += elapsed;
    }

    pub fn average_duration(&self) -> Option<Duration> {
        (self.executions > 0)
            .then(|| Duration::from_secs_f64(self.total_duration.as_secs_f64() / self.executions as f64))
    }
}

pub(super) enum TaskBody {
    Repeating(RepeatingAction),
    Once(Option<WorkFactory>),
}

impl TaskBody {
    fn next_factory(&mut self) -> Option<WorkFactory> {
        match self {
            TaskBody::Repeating(action) => {
                let action = Arc::clone(action);
                Some(Box::new(move || action()))
            }
            TaskBody::Once(factory) => factory.take(),
        }
    }

    fn is_once(&self) -> bool {
        matches!(self, TaskBody::Once(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════

struct Entry {
    generation: u64,
    handle: JoinHandle<()>,
    stats: Arc<Mutex<PeriodicTaskStats>>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

/// Live task loops keyed by id. A generation number keeps a finished loop
/// from unregistering the loop that replaced it.
#[derive(Clone, Default)]
pub(super) struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Registry {
    /// Register a loop under `id`, aborting any loop it replaces.
    /// `spawn` runs under the registry lock so the new loop cannot
    /// unregister itself before it is recorded.
    pub(super) fn insert_with(
        &self,
        id: &str,
        stats: Arc<Mutex<PeriodicTaskStats>>,
        spawn: impl FnOnce(u64) -> JoinHandle<()>,
    ) -> bool {
        let mut state = lock(&self.state);
        let generation = state.next_generation;
        state.next_generation += 1;

        let handle = spawn(generation);
        let replaced = state.entries.insert(
            id.to_string(),
            Entry {
                generation,
                handle,
                stats,
            },
        );
        match replaced {
            Some(old) => {
                old.handle.abort();
                true
            }
            None => false,
        }
    }

    fn release(&self, id: &str, generation: u64) {
        let mut state = lock(&self.state);
        if state
            .entries
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
        {
            state.entries.remove(id);
        }
    }

    pub(super) fn cancel(&self, id: &str) -> bool {
        match lock(&self.state).entries.remove(id) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    pub(super) fn stats(&self, id: &str) -> Option<PeriodicTaskStats> {
        lock(&self.state)
            .entries
            .get(id)
            .map(|entry| lock(&entry.stats).clone())
    }

    pub(super) fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = lock(&self.state).entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub(super) fn take_all(&self) -> Vec<JoinHandle<()>> {
        lock(&self.state)
            .entries
            .drain()
            .map(|(_, entry)| entry.handle)
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Loop
// ═══════════════════════════════════════════════════════════════════════════

pub(super) struct LoopContext {
    pub client: Arc<str>,
    pub registry: Registry,
    pub dispatch: Option<PriorityTaskQueue>,
    pub limits: ExecutionLimits,
    pub max_lag: Duration,
}

pub(super) struct TaskLoop {
    pub id: String,
    pub generation: u64,
    pub priority: Priority,
    pub period: Duration,
    pub first_run: Instant,
    pub body: TaskBody,
    pub stats: Arc<Mutex<PeriodicTaskStats>>,
}

impl TaskLoop {
    pub(super) fn new_stats(period: Duration, priority: Priority) -> Arc<Mutex<PeriodicTaskStats>> {
        Arc::new(Mutex::new(PeriodicTaskStats::new(period, priority)))
    }

    pub(super) async fn run(mut self, ctx: LoopContext, mut shutdown: watch::Receiver<bool>) {
        let mut next_run = self.first_run;
        lock(&self.stats).next_deadline = Some(next_run);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep_until(next_run) => {}
            }

            // Anchor to the previous deadline, not to completion time
            let now = Instant::now();
            let lag = now.saturating_duration_since(next_run);
            if lag > ctx.max_lag {
                debug!(client = %ctx.client, task = %self.id, ?lag, "periodic task behind, resynchronising");
                lock(&self.stats).resyncs += 1;
                next_run = now;
            }
            next_run += self.period;

            let Some(factory) = self.body.next_factory() else {
                break;
            };
            let once = self.body.is_once();
            lock(&self.stats).next_deadline = (!once).then_some(next_run);

            match &ctx.dispatch {
                Some(queue) => self.dispatch(queue, &ctx.client, factory),
                None => {
                    if !execute(&self.id, &self.stats, factory, &ctx, &mut shutdown).await {
                        break;
                    }
                }
            }

            if once {
                break;
            }
        }

        ctx.registry.release(&self.id, self.generation);
        debug!(client = %ctx.client, task = %self.id, "task loop finished");
    }

    /// Hand the tick to the shared queue; a tick still pending from the
    /// previous period is replaced rather than duplicated.
    fn dispatch(&self, queue: &PriorityTaskQueue, client: &str, factory: WorkFactory) {
        let key = format!("{client}/{}", self.id);
        let stats = Arc::clone(&self.stats);
        let accepted = queue.try_enqueue(key.clone(), self.priority, Some(&key), move || async move {
            let started = Instant::now();
            let result = factory().await;
            lock(&stats).record(started.elapsed(), result.is_ok());
            result
        });
        if !accepted {
            debug!(client, task = %self.id, "periodic tick dropped by dispatch queue");
        }
    }
}

/// Run inline. Returns false when shutdown cancelled the execution.
async fn execute(
    id: &str,
    stats: &Arc<Mutex<PeriodicTaskStats>>,
    factory: WorkFactory,
    ctx: &LoopContext,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let outcome = run_guarded(id, factory(), ctx.limits, shutdown).await;
    let mut stats = lock(stats);
    match outcome {
        Outcome::Completed { elapsed } => stats.record(elapsed, true),
        Outcome::Failed { elapsed, .. } => stats.record(elapsed, false),
        Outcome::TimedOut { .. } => stats.record(ctx.limits.timeout, false),
        Outcome::Cancelled => return false,
    }
    true
}
