pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod input;
pub mod probe;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod selector;
pub mod signal;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-exports for convenience
pub use config::{default_config_path, load_config, sample_config, save_config, validate};
pub use error::{ActionError, ActionResult, ConfigError, EngineError, ValidationIssue};
pub use frame::{CaptureRegion, Frame, FrameSource, ScriptedFrameSource, StaticFrameSource};
pub use input::{DryRunInjector, InputInjector, RecordingInjector, WindowHandle};
pub use probe::{Debouncer, ProbeResult};
pub use queue::{PriorityTaskQueue, QueueStatistics};
pub use runtime::{Automation, ClientStats, Engine, EngineBuilder, EngineReport};
pub use scheduler::ActionScheduler;
pub use selector::{Decision, TargetSelector};
pub use signal::{EngineSignal, SignalBus, SignalHandler, SignalTally};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
