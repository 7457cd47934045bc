//! Guarded execution of one unit of scheduled work.
//!
//! Every execution runs in its own tokio task under a timeout and observes
//! the shutdown token. Nothing a task does (error, panic, hang) escapes, and
//! the task never outlives the future awaiting it.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{ActionError, ActionResult};

pub type ActionFuture = Pin<Box<dyn Future<Output = ActionResult> + Send + 'static>>;

/// Zero-argument async action, consumed on execution.
pub type WorkFactory = Box<dyn FnOnce() -> ActionFuture + Send + 'static>;

#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    /// Successful executions slower than this are logged as warnings
    pub slow: Duration,
}

impl ExecutionLimits {
    pub fn from_millis(timeout_ms: u64, slow_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            slow: Duration::from_millis(slow_ms),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Completed { elapsed: Duration },
    Failed { error: ActionError, elapsed: Duration },
    /// Carries [`ActionError::TimedOut`] with the limit that was exceeded
    TimedOut { error: ActionError },
    /// Shutdown interrupted the execution
    Cancelled,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. } | Outcome::TimedOut { .. })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Outcome::Completed { elapsed } | Outcome::Failed { elapsed, .. } => Some(*elapsed),
            Outcome::TimedOut { .. } | Outcome::Cancelled => None,
        }
    }
}

/// Resolves once `rx` carries `true` or its sender is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Aborts the spawned action when the awaiting future is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub(crate) async fn run_guarded(
    id: &str,
    action: ActionFuture,
    limits: ExecutionLimits,
    shutdown: &mut watch::Receiver<bool>,
) -> Outcome {
    let started = Instant::now();
    let mut handle = tokio::spawn(action);
    let _guard = AbortOnDrop(handle.abort_handle());

    let result = tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => {
            handle.abort();
            debug!(work_id = id, "execution cancelled by shutdown");
            return Outcome::Cancelled;
        }
        r = tokio::time::timeout(limits.timeout, &mut handle) => r,
    };

    let elapsed = started.elapsed();
    match result {
        Err(_) => {
            handle.abort();
            let error = ActionError::TimedOut(limits.timeout);
            warn!(work_id = id, %error, "task timed out");
            Outcome::TimedOut { error }
        }
        Ok(Err(join_err)) if join_err.is_cancelled() => Outcome::Cancelled,
        Ok(Err(join_err)) => {
            let message = panic_message(join_err);
            error!(work_id = id, panic = %message, "task panicked");
            Outcome::Failed {
                error: ActionError::Panicked(message),
                elapsed,
            }
        }
        Ok(Ok(Err(error))) => {
            warn!(work_id = id, error = %error, "task failed");
            Outcome::Failed { error, elapsed }
        }
        Ok(Ok(Ok(()))) => {
            if elapsed > limits.slow {
                warn!(work_id = id, ?elapsed, "slow task");
            }
            Outcome::Completed { elapsed }
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn limits() -> ExecutionLimits {
        ExecutionLimits::from_millis(1_000, 200)
    }

    #[tokio::test(start_paused = true)]
    async fn completes_and_reports_elapsed() {
        let (_tx, mut rx) = watch::channel(false);
        let action: ActionFuture = Box::pin(async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        });
        let outcome = run_guarded("slow-but-fine", action, limits(), &mut rx).await;
        assert!(matches!(outcome, Outcome::Completed { .. }));
        assert!(!outcome.is_failure());
        assert!(outcome.elapsed().unwrap() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let (_tx, mut rx) = watch::channel(false);
        let action: ActionFuture = Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let outcome = run_guarded("hang", action, limits(), &mut rx).await;
        assert!(outcome.is_failure());
        match outcome {
            Outcome::TimedOut {
                error: ActionError::TimedOut(after),
            } => assert_eq!(after, Duration::from_secs(1)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_guarded_future_stops_the_action() {
        let (_tx, mut rx) = watch::channel(false);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let action: ActionFuture = Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let outer = tokio::spawn(async move {
            run_guarded("abandoned", action, limits(), &mut rx).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        outer.abort();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn contains_panics() {
        let (_tx, mut rx) = watch::channel(false);
        let action: ActionFuture = Box::pin(async {
            let explode = true;
            if explode {
                panic!("boom");
            }
            Ok(())
        });
        let outcome = run_guarded("panics", action, limits(), &mut rx).await;
        match outcome {
            Outcome::Failed {
                error: ActionError::Panicked(msg),
                ..
            } => assert_eq!(msg, "boom"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_silently() {
        let (tx, mut rx) = watch::channel(false);
        let action: ActionFuture = Box::pin(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });
        let outcome = run_guarded("cancelled", action, limits(), &mut rx).await;
        assert!(matches!(outcome, Outcome::Cancelled));
        assert!(!outcome.is_failure());
    }
}
