use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus_types::{Priority, SchedulerConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::events::{EventQueue, EventStats};
use super::periodic::{LoopContext, PeriodicTaskStats, Registry, RepeatingAction, TaskBody, TaskLoop};
use crate::error::ActionResult;
use crate::lock;
use crate::queue::{ActionFuture, ExecutionLimits, PriorityTaskQueue, WorkFactory};

/// Per-client owner of periodic loops and the event queue.
///
/// Must be created inside a tokio runtime: the event consumer is spawned on
/// construction. Dropping the scheduler stops every loop it owns.
pub struct ActionScheduler {
    client: Arc<str>,
    config: SchedulerConfig,
    limits: ExecutionLimits,
    shutdown: watch::Sender<bool>,
    registry: Registry,
    events: Arc<EventQueue>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    dispatch: Option<PriorityTaskQueue>,
}

impl ActionScheduler {
    /// Periodic ticks run inline in their own loop.
    pub fn new(client: impl Into<String>, config: &SchedulerConfig) -> Self {
        Self::build(client.into(), config, None)
    }

    /// Periodic ticks are enqueued on `queue`, coalesced per task id.
    pub fn with_dispatch(
        client: impl Into<String>,
        config: &SchedulerConfig,
        queue: PriorityTaskQueue,
    ) -> Self {
        Self::build(client.into(), config, Some(queue))
    }

    fn build(client: String, config: &SchedulerConfig, dispatch: Option<PriorityTaskQueue>) -> Self {
        let client: Arc<str> = client.into();
        let limits = ExecutionLimits::from_millis(config.task_timeout_ms, config.slow_task_ms);
        let (shutdown, rx) = watch::channel(false);

        let events = Arc::new(EventQueue::new(
            Arc::clone(&client),
            config.max_pending_events,
            Duration::from_millis(config.event_throttle_ms),
        ));
        let consumer = tokio::spawn(Arc::clone(&events).consume(limits, rx));

        Self {
            client,
            config: config.clone(),
            limits,
            shutdown,
            registry: Registry::default(),
            events,
            consumer: Mutex::new(Some(consumer)),
            dispatch,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run `action` every `period`, starting now. Replaces any task with the same id.
    pub fn schedule_periodic<F, Fut>(
        &self,
        id: impl Into<String>,
        period: Duration,
        priority: Priority,
        action: F,
    ) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let action: RepeatingAction = Arc::new(move || -> ActionFuture { Box::pin(action()) });
        self.spawn_task(
            id.into(),
            period.max(Duration::from_millis(1)),
            priority,
            Instant::now(),
            TaskBody::Repeating(action),
        )
    }

    /// Run `action` once after `delay`. The task unregisters itself afterwards.
    pub fn schedule_once<F, Fut>(
        &self,
        id: impl Into<String>,
        delay: Duration,
        priority: Priority,
        action: F,
    ) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let factory: WorkFactory = Box::new(move || -> ActionFuture { Box::pin(action()) });
        self.spawn_task(
            id.into(),
            Duration::ZERO,
            priority,
            Instant::now() + delay,
            TaskBody::Once(Some(factory)),
        )
    }

    fn spawn_task(
        &self,
        id: String,
        period: Duration,
        priority: Priority,
        first_run: Instant,
        body: TaskBody,
    ) -> bool {
        if self.is_shut_down() {
            warn!(client = %self.client, task = %id, "scheduler is shut down, task not scheduled");
            return false;
        }

        let stats = TaskLoop::new_stats(period, priority);
        let ctx = LoopContext {
            client: Arc::clone(&self.client),
            registry: self.registry.clone(),
            dispatch: self.dispatch.clone(),
            limits: self.limits,
            max_lag: Duration::from_millis(self.config.max_lag_ms),
        };
        let shutdown = self.shutdown.subscribe();

        let replaced = self.registry.insert_with(&id, Arc::clone(&stats), |generation| {
            let task = TaskLoop {
                id: id.clone(),
                generation,
                priority,
                period,
                first_run,
                body,
                stats,
            };
            tokio::spawn(task.run(ctx, shutdown))
        });

        if replaced {
            debug!(client = %self.client, task = %id, "replaced scheduled task");
        } else {
            debug!(client = %self.client, task = %id, ?period, %priority, "scheduled task");
        }
        true
    }

    /// Queue an ad-hoc action. Returns false if it was throttled or dropped.
    ///
    /// A second event with the same id inside the throttle window is
    /// dropped, not merged.
    pub fn schedule_event<F, Fut>(&self, id: impl Into<String>, priority: Priority, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.events
            .push(id.into(), priority, Box::new(move || -> ActionFuture { Box::pin(action()) }))
    }

    pub fn cancel(&self, id: &str) -> bool {
        let cancelled = self.registry.cancel(id);
        if cancelled {
            debug!(client = %self.client, task = id, "cancelled task");
        }
        cancelled
    }

    pub fn periodic_stats(&self, id: &str) -> Option<PeriodicTaskStats> {
        self.registry.stats(id)
    }

    /// Ids of registered periodic and one-shot tasks, sorted.
    pub fn task_ids(&self) -> Vec<String> {
        self.registry.ids()
    }

    pub fn event_stats(&self) -> EventStats {
        self.events.stats()
    }

    /// Stop every loop, cancel in-flight work and drop pending events.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let dropped = self.events.close();

        let mut handles = self.registry.take_all();
        handles.extend(lock(&self.consumer).take());
        for handle in handles {
            if let Err(e) = handle.await
                && e.is_panic()
            {
                warn!(client = %self.client, error = %e, "scheduler task panicked");
            }
        }

        info!(client = %self.client, dropped_events = dropped, "scheduler stopped");
    }
}
