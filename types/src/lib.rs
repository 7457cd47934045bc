//! Shared configuration and value types for ARGUS.
//!
//! Everything here is plain data: serde-serializable, cheap to clone, and
//! immutable for the lifetime of a running session. The engine in
//! `argus-core` consumes these definitions; the CLI loads and saves them.

mod color;
mod config;
mod input;
mod priority;
mod probe;

pub use color::{ColorMetric, Rgb};
pub use config::{
    AppConfig, ClientConfig, MAX_CLIENTS, MemberConfig, PeriodicActionConfig, ProbeBinding,
    QueueConfig, SchedulerConfig, SelectorConfig,
};
pub use input::{InputAction, MouseButton, Point};
pub use priority::Priority;
pub use probe::{ProbeConfig, ProbeGeometry, ProbeMode};
