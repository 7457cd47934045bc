//! Multi-target priority selector with preemption
//!
//! ```text
//!   Idle ──triggered──▶ NeedsAction ──chosen──▶ Acting ──finish──▶ Cooldown ──rearm──▶ Idle
//!                                                 │ ▲
//!                                                 └─┘ preempted by a target ahead by > margin
//! ```
//!
//! A sequence is select input, humanize delay, act input. Preemption is
//! checked after the humanize delay, before the act input goes out.
//! Sequence starts are spaced by `min_action_spacing_ms`, and every finished
//! sequence holds a global animation lock for `animation_delay_ms`.

mod target;
mod target_selector;

#[cfg(test)]
mod target_selector_tests;

pub use target::{SelectorStats, TargetPhase, TargetState};
pub use target_selector::{Decision, SequenceReport, TargetSelector};
