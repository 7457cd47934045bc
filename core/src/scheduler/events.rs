//! Event-driven actions: throttled on enqueue, drained by a single consumer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus_types::Priority;
use hashbrown::HashMap;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tracing::debug;

use crate::lock;
use crate::queue::{ExecutionLimits, Outcome, PriorityBuckets, PushOutcome, WorkFactory};
use crate::queue::{run_guarded, shutdown_requested};

/// Throttle bookkeeping is pruned once it tracks this many ids.
const THROTTLE_PRUNE_AT: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    pub enqueued: u64,
    pub executed: u64,
    /// Includes timeouts
    pub failed: u64,
    /// Same id again inside the throttle window
    pub throttled: u64,
    /// Rejected on overflow or after shutdown, or pending at shutdown
    pub dropped: u64,
    pub evicted: u64,
    pub pending: usize,
}

struct PendingEvent {
    id: String,
    factory: WorkFactory,
    enqueued_at: Instant,
}

struct EventState {
    pending: PriorityBuckets<PendingEvent>,
    last_enqueued: HashMap<String, Instant>,
    stats: EventStats,
    closed: bool,
}

pub(super) struct EventQueue {
    client: Arc<str>,
    state: Mutex<EventState>,
    ready: Notify,
    throttle: Duration,
}

impl EventQueue {
    pub(super) fn new(client: Arc<str>, capacity: usize, throttle: Duration) -> Self {
        Self {
            client,
            state: Mutex::new(EventState {
                pending: PriorityBuckets::new(capacity),
                last_enqueued: HashMap::new(),
                stats: EventStats::default(),
                closed: false,
            }),
            ready: Notify::new(),
            throttle,
        }
    }

    pub(super) fn push(&self, id: String, priority: Priority, factory: WorkFactory) -> bool {
        let now = Instant::now();
        let mut state = lock(&self.state);

        if state.closed {
            state.stats.dropped += 1;
            return false;
        }

        // Drop, don't replace: the pending instance already covers this trigger
        if let Some(last) = state.last_enqueued.get(&id)
            && now.saturating_duration_since(*last) < self.throttle
        {
            state.stats.throttled += 1;
            debug!(client = %self.client, event = %id, "event throttled");
            return false;
        }

        if state.last_enqueued.len() >= THROTTLE_PRUNE_AT {
            let throttle = self.throttle;
            state
                .last_enqueued
                .retain(|_, last| now.saturating_duration_since(*last) < throttle);
        }

        let event = PendingEvent {
            id: id.clone(),
            factory,
            enqueued_at: now,
        };
        match state.pending.push(priority, event) {
            PushOutcome::Queued => {}
            PushOutcome::Evicted { victim, level } => {
                state.stats.evicted += 1;
                debug!(client = %self.client, evicted = %victim.id, evicted_priority = %level, "event queue full, evicted");
            }
            PushOutcome::Rejected(_) => {
                state.stats.dropped += 1;
                debug!(client = %self.client, event = %id, %priority, "event queue full, dropping");
                return false;
            }
        }

        state.last_enqueued.insert(id, now);
        state.stats.enqueued += 1;
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Reject further events and drop everything pending.
    pub(super) fn close(&self) -> usize {
        let mut state = lock(&self.state);
        state.closed = true;
        let dropped = state.pending.drain().len();
        state.stats.dropped += dropped as u64;
        dropped
    }

    pub(super) fn stats(&self) -> EventStats {
        let state = lock(&self.state);
        EventStats {
            pending: state.pending.len(),
            ..state.stats
        }
    }

    /// Executes events one at a time, highest priority first.
    pub(super) async fn consume(
        self: Arc<Self>,
        limits: ExecutionLimits,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let next = lock(&self.state).pending.pop();
            let Some((priority, event)) = next else {
                tokio::select! {
                    _ = self.ready.notified() => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
                continue;
            };

            debug!(
                client = %self.client,
                event = %event.id,
                %priority,
                waited = ?event.enqueued_at.elapsed(),
                "executing event"
            );
            let outcome = run_guarded(&event.id, (event.factory)(), limits, &mut shutdown).await;

            let mut state = lock(&self.state);
            match outcome {
                Outcome::Completed { .. } => state.stats.executed += 1,
                Outcome::Failed { .. } | Outcome::TimedOut { .. } => state.stats.failed += 1,
                Outcome::Cancelled => break,
            }
        }
        debug!(client = %self.client, "event consumer exiting");
    }
}
