//! Engine runtime
//!
//! ```text
//!                  ┌──────────── Engine (Automation) ────────────┐
//!   FrameSource ─▶ │ ClientRuntime ─ probes ─▶ ActionScheduler ──┼─▶ PriorityTaskQueue ─▶ InputInjector
//!                  │      │                                      │          ▲
//!                  │      └──── members ─▶ TargetSelector ───────┼──────────┘
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! One frame loop per enabled client; all clients share a single dispatch
//! queue. Stopping the engine stops the loops first, then each client's
//! scheduler, then the queue.

mod client;
mod engine;


pub use client::{ClientCounters, ClientStats};
pub use engine::{Automation, Engine, EngineBuilder, EngineReport};
