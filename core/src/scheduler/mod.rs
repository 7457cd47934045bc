//! Per-client action scheduling
//!
//! Two facilities share one execution model ([`crate::queue::run_guarded`]):
//!
//! - **Periodic tasks**: one drift-corrected loop per id. The next deadline
//!   is advanced by the period before the action runs, and a loop that falls
//!   more than `max_lag_ms` behind re-anchors to now instead of bursting.
//! - **Events**: ad-hoc actions throttled per id on enqueue, held in bounded
//!   priority buckets and executed one at a time by a single consumer.

mod action_scheduler;
mod events;
mod periodic;


pub use action_scheduler::ActionScheduler;
pub use events::EventStats;
pub use periodic::{PeriodicTaskStats, RepeatingAction};
