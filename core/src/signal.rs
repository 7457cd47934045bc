//! Telemetry signals published by the engine.
//!
//! Signals are fire-and-forget: nothing in the engine waits on a subscriber,
//! and a slow subscriber only loses old signals.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use crate::probe::EdgeDirection;
use crate::queue::QueueStatistics;

/// Capacity of the broadcast channel.
pub const SIGNAL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The frame source returned nothing
    CaptureFailed,
    /// The loop fell behind and ticks were skipped
    MissedTicks(u64),
}

/// "Interesting things that happened", for logging and UI layers.
#[derive(Debug, Clone)]
pub enum EngineSignal {
    ProbeTriggered {
        client: String,
        probe: String,
        /// Set for member health probes
        member: Option<usize>,
        edge: Option<EdgeDirection>,
        timestamp: Instant,
    },
    ActionExecuted {
        client: String,
        /// Member label or probe name
        target: String,
        /// Click location or key
        action: String,
        timestamp: Instant,
    },
    QueueStatistics {
        stats: QueueStatistics,
        timestamp: Instant,
    },
    FrameSkipped {
        client: String,
        reason: SkipReason,
        timestamp: Instant,
    },
}

impl EngineSignal {
    pub fn timestamp(&self) -> Instant {
        match self {
            EngineSignal::ProbeTriggered { timestamp, .. }
            | EngineSignal::ActionExecuted { timestamp, .. }
            | EngineSignal::QueueStatistics { timestamp, .. }
            | EngineSignal::FrameSkipped { timestamp, .. } => *timestamp,
        }
    }
}

/// Consumer of engine signals.
pub trait SignalHandler {
    fn handle_signal(&mut self, signal: &EngineSignal);

    fn handle_signals(&mut self, signals: &[EngineSignal]) {
        for signal in signals {
            self.handle_signal(signal);
        }
    }
}

/// Publishing side. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<EngineSignal>,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(SIGNAL_CAPACITY)
    }
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to current subscribers; without subscribers the signal is discarded.
    pub fn publish(&self, signal: EngineSignal) {
        let _ = self.tx.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineSignal> {
        self.tx.subscribe()
    }
}

/// Drive `handler` from `rx` until every sender is gone, then hand it back.
pub fn spawn_handler<H>(mut rx: broadcast::Receiver<EngineSignal>, mut handler: H) -> JoinHandle<H>
where
    H: SignalHandler + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(signal) => handler.handle_signal(&signal),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "signal handler lagging, signals dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        handler
    })
}

/// Counts signals by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalTally {
    pub probes_triggered: u64,
    pub actions_executed: u64,
    pub frames_skipped: u64,
    pub statistics_reports: u64,
}

impl SignalHandler for SignalTally {
    fn handle_signal(&mut self, signal: &EngineSignal) {
        match signal {
            EngineSignal::ProbeTriggered { .. } => self.probes_triggered += 1,
            EngineSignal::ActionExecuted { .. } => self.actions_executed += 1,
            EngineSignal::FrameSkipped { .. } => self.frames_skipped += 1,
            EngineSignal::QueueStatistics { .. } => self.statistics_reports += 1,
        }
    }
}
