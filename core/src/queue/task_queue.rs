//! Bounded, strict-priority work queue drained by a fixed worker pool.

use std::future::Future;
use std::sync::{Arc, Mutex};

use argus_types::{Priority, QueueConfig};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::buckets::{PriorityBuckets, PushOutcome};
use super::execution::{
    ActionFuture, ExecutionLimits, Outcome, WorkFactory, run_guarded, shutdown_requested,
};
use super::stats::QueueStatistics;
use crate::error::ActionResult;
use crate::lock;

struct QueuedWork {
    id: String,
    coalescing_key: Option<String>,
    factory: WorkFactory,
    enqueued_at: Instant,
}

struct QueueState {
    buckets: PriorityBuckets<QueuedWork>,
    stats: QueueStatistics,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    work_available: Notify,
    shutdown: watch::Sender<bool>,
    limits: ExecutionLimits,
    concurrency: usize,
}

/// Shared dispatch pool. Cheap to clone; all clones feed the same workers.
#[derive(Clone)]
pub struct PriorityTaskQueue {
    shared: Arc<Shared>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PriorityTaskQueue {
    pub fn new(config: &QueueConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    buckets: PriorityBuckets::new(config.max_queue_size),
                    stats: QueueStatistics::default(),
                    closed: false,
                }),
                work_available: Notify::new(),
                shutdown,
                limits: ExecutionLimits::from_millis(config.task_timeout_ms, config.slow_task_ms),
                concurrency: config.max_concurrency.max(1),
            }),
            workers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Offer work to the queue. Returns false if it was dropped.
    ///
    /// With a `coalescing_key`, a pending item carrying the same key is
    /// replaced by this one instead of growing the queue.
    pub fn try_enqueue<F, Fut>(
        &self,
        id: impl Into<String>,
        priority: Priority,
        coalescing_key: Option<&str>,
        factory: F,
    ) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let id = id.into();
        let work = QueuedWork {
            id,
            coalescing_key: coalescing_key.map(str::to_string),
            factory: Box::new(move || -> ActionFuture { Box::pin(factory()) }),
            enqueued_at: Instant::now(),
        };

        let mut state = lock(&self.shared.state);
        if state.closed {
            state.stats.level_mut(priority).dropped += 1;
            debug!(work_id = %work.id, "queue closed, dropping work");
            return false;
        }

        if let Some(key) = coalescing_key
            && let Some((old_priority, old)) = state
                .buckets
                .remove_first(|w| w.coalescing_key.as_deref() == Some(key))
        {
            state.stats.level_mut(old_priority).coalesced += 1;
            debug!(work_id = %work.id, replaced = %old.id, key, "coalesced pending work");
        }

        match state.buckets.push(priority, work) {
            PushOutcome::Queued => {}
            PushOutcome::Evicted { victim, level } => {
                state.stats.level_mut(level).evicted += 1;
                debug!(
                    evicted = %victim.id,
                    evicted_priority = %level,
                    %priority,
                    "queue full, evicted lower-priority work"
                );
            }
            PushOutcome::Rejected(work) => {
                state.stats.level_mut(priority).dropped += 1;
                debug!(work_id = %work.id, %priority, "queue full, dropping work");
                return false;
            }
        }

        state.stats.level_mut(priority).enqueued += 1;
        drop(state);
        self.shared.work_available.notify_one();
        true
    }

    /// Spawn the worker pool. Calling it again while workers run is a no-op.
    pub fn start(&self) {
        let mut workers = lock(&self.workers);
        if !workers.is_empty() {
            return;
        }
        for worker in 0..self.shared.concurrency {
            let shared = Arc::clone(&self.shared);
            workers.push(tokio::spawn(worker_loop(shared, worker)));
        }
        info!(workers = self.shared.concurrency, "task queue started");
    }

    /// Stop the workers, cancel in-flight work and drop everything pending.
    /// Returns the number of pending items that were dropped.
    pub async fn shutdown(&self) -> usize {
        let _ = self.shared.shutdown.send(true);

        let drained = {
            let mut state = lock(&self.shared.state);
            state.closed = true;
            let drained = state.buckets.drain();
            for (priority, _) in &drained {
                state.stats.level_mut(*priority).dropped += 1;
            }
            drained.len()
        };

        let handles: Vec<_> = lock(&self.workers).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await
                && e.is_panic()
            {
                warn!(error = %e, "queue worker panicked");
            }
        }

        info!(drained, "task queue stopped");
        drained
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.state).buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of pending work in the order it would be dequeued.
    pub fn pending_ids(&self) -> Vec<String> {
        lock(&self.shared.state)
            .buckets
            .iter()
            .map(|(_, w)| w.id.clone())
            .collect()
    }

    pub fn statistics(&self) -> QueueStatistics {
        let state = lock(&self.shared.state);
        let mut stats = state.stats.clone();
        stats.pending = state.buckets.len();
        stats
    }
}

async fn worker_loop(shared: Arc<Shared>, worker: usize) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = lock(&shared.state).buckets.pop();
        let Some((priority, work)) = next else {
            tokio::select! {
                _ = shared.work_available.notified() => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
            continue;
        };

        let waited = work.enqueued_at.elapsed();
        debug!(worker, work_id = %work.id, %priority, ?waited, "dequeued");

        let outcome = run_guarded(&work.id, (work.factory)(), shared.limits, &mut shutdown).await;

        let mut state = lock(&shared.state);
        let counters = state.stats.level_mut(priority);
        match outcome {
            Outcome::Completed { .. } => counters.processed += 1,
            Outcome::Failed { .. } => counters.failed += 1,
            Outcome::TimedOut { .. } => {
                counters.failed += 1;
                counters.timed_out += 1;
            }
            Outcome::Cancelled => break,
        }
    }

    debug!(worker, "queue worker exiting");
}
