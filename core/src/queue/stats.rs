use argus_types::Priority;
use serde::Serialize;

/// Counters for one priority level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityCounters {
    pub enqueued: u64,
    pub processed: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub coalesced: u64,
    /// Includes timeouts
    pub failed: u64,
    pub timed_out: u64,
}

impl PriorityCounters {
    fn add(&mut self, other: &PriorityCounters) {
        self.enqueued += other.enqueued;
        self.processed += other.processed;
        self.dropped += other.dropped;
        self.evicted += other.evicted;
        self.coalesced += other.coalesced;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
    }
}

/// Point-in-time snapshot of a queue's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatistics {
    /// Indexed by [`Priority::index`]
    pub levels: [PriorityCounters; Priority::COUNT],
    pub pending: usize,
}

impl QueueStatistics {
    pub fn level(&self, priority: Priority) -> &PriorityCounters {
        &self.levels[priority.index()]
    }

    pub(crate) fn level_mut(&mut self, priority: Priority) -> &mut PriorityCounters {
        &mut self.levels[priority.index()]
    }

    pub fn totals(&self) -> PriorityCounters {
        let mut total = PriorityCounters::default();
        for level in &self.levels {
            total.add(level);
        }
        total
    }
}

impl std::fmt::Display for QueueStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.totals();
        write!(
            f,
            "pending={} enqueued={} processed={} dropped={} evicted={} coalesced={} failed={} timed_out={}",
            self.pending,
            t.enqueued,
            t.processed,
            t.dropped,
            t.evicted,
            t.coalesced,
            t.failed,
            t.timed_out
        )
    }
}
