//! Bounded priority work queue
//!
//! ```text
//!   try_enqueue(id, priority, key?) ──▶ [Critical] [High] [Normal] [Low] [Maintenance]
//!                                           │ strict priority, FIFO within a level
//!                                           ▼
//!                                 N workers ─▶ run_guarded (timeout, panic/err contained)
//! ```
//!
//! Overflow evicts the oldest item of the lowest level strictly below the
//! incoming one, otherwise the incoming item is dropped. Coalescing keys
//! keep at most one pending instance of a logical operation.

mod buckets;
mod execution;
mod stats;
mod task_queue;

#[cfg(test)]
mod task_queue_tests;

pub use buckets::{PriorityBuckets, PushOutcome};
pub use execution::{ActionFuture, ExecutionLimits, Outcome, WorkFactory};
pub(crate) use execution::{run_guarded, shutdown_requested};
pub use stats::{PriorityCounters, QueueStatistics};
pub use task_queue::PriorityTaskQueue;
