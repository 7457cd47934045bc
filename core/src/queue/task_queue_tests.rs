//! Tests for the priority task queue
//!
//! Ordering, eviction, coalescing, failure isolation and shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use argus_types::{Priority, QueueConfig};

use super::PriorityTaskQueue;
use crate::error::ActionError;

fn config(max_queue_size: usize, max_concurrency: usize) -> QueueConfig {
    QueueConfig {
        max_queue_size,
        max_concurrency,
        ..QueueConfig::default()
    }
}

type Log = Arc<Mutex<Vec<String>>>;

/// Enqueue work that appends `label` to `log` when it runs.
fn enqueue_logged(
    queue: &PriorityTaskQueue,
    log: &Log,
    label: &str,
    priority: Priority,
    key: Option<&str>,
) -> bool {
    let log = Arc::clone(log);
    let label = label.to_string();
    queue.try_enqueue(label.clone(), priority, key, move || async move {
        log.lock().unwrap().push(label);
        Ok(())
    })
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_drains_highest_priority_first_fifo_within_level() {
    let queue = PriorityTaskQueue::new(&config(16, 1));
    let log: Log = Arc::default();

    enqueue_logged(&queue, &log, "low", Priority::Low, None);
    enqueue_logged(&queue, &log, "crit-1", Priority::Critical, None);
    enqueue_logged(&queue, &log, "normal", Priority::Normal, None);
    enqueue_logged(&queue, &log, "crit-2", Priority::Critical, None);
    enqueue_logged(&queue, &log, "maint", Priority::Maintenance, None);

    let expected = vec!["crit-1", "crit-2", "normal", "low", "maint"];
    assert_eq!(queue.pending_ids(), expected);

    queue.start();
    wait_until(|| queue.statistics().totals().processed == 5).await;
    assert_eq!(*log.lock().unwrap(), expected);
    queue.shutdown().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Overflow
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_critical_never_dropped_while_low_is_evictable() {
    let queue = PriorityTaskQueue::new(&config(4, 1));
    let log: Log = Arc::default();

    for i in 0..4 {
        assert!(enqueue_logged(&queue, &log, &format!("low-{i}"), Priority::Low, None));
    }
    for i in 0..4 {
        assert!(
            enqueue_logged(&queue, &log, &format!("crit-{i}"), Priority::Critical, None),
            "critical item {i} must evict a low item"
        );
    }

    let stats = queue.statistics();
    assert_eq!(stats.level(Priority::Low).evicted, 4);
    assert_eq!(stats.level(Priority::Critical).enqueued, 4);
    assert_eq!(stats.level(Priority::Critical).dropped, 0);
    assert_eq!(stats.pending, 4);
    assert_eq!(queue.pending_ids(), vec!["crit-0", "crit-1", "crit-2", "crit-3"]);

    // Nothing lower left to evict
    assert!(!enqueue_logged(&queue, &log, "crit-4", Priority::Critical, None));
    assert_eq!(queue.statistics().level(Priority::Critical).dropped, 1);
}

#[tokio::test]
async fn test_eviction_takes_oldest_of_lowest_level() {
    let queue = PriorityTaskQueue::new(&config(3, 1));
    let log: Log = Arc::default();

    enqueue_logged(&queue, &log, "low-old", Priority::Low, None);
    enqueue_logged(&queue, &log, "maint", Priority::Maintenance, None);
    enqueue_logged(&queue, &log, "low-new", Priority::Low, None);

    assert!(enqueue_logged(&queue, &log, "normal", Priority::Normal, None));
    assert_eq!(queue.pending_ids(), vec!["normal", "low-old", "low-new"]);

    assert!(enqueue_logged(&queue, &log, "high", Priority::High, None));
    assert_eq!(queue.pending_ids(), vec!["high", "normal", "low-new"]);

    let stats = queue.statistics();
    assert_eq!(stats.level(Priority::Maintenance).evicted, 1);
    assert_eq!(stats.level(Priority::Low).evicted, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Coalescing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_coalescing_keeps_latest_factory() {
    let queue = PriorityTaskQueue::new(&config(8, 1));
    let log: Log = Arc::default();

    assert!(enqueue_logged(&queue, &log, "first", Priority::Normal, Some("refresh")));
    assert!(enqueue_logged(&queue, &log, "second", Priority::Normal, Some("refresh")));
    assert!(enqueue_logged(&queue, &log, "other", Priority::Normal, Some("sample")));

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pending_ids(), vec!["second", "other"]);
    assert_eq!(queue.statistics().level(Priority::Normal).coalesced, 1);

    queue.start();
    wait_until(|| queue.statistics().totals().processed == 2).await;
    assert_eq!(*log.lock().unwrap(), vec!["second", "other"]);
    queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_coalesced_replacement_goes_behind_later_work() {
    let queue = PriorityTaskQueue::new(&config(8, 1));
    let log: Log = Arc::default();

    assert!(enqueue_logged(&queue, &log, "buff-1", Priority::Normal, Some("buff")));
    assert!(enqueue_logged(&queue, &log, "loot", Priority::Normal, None));
    assert!(enqueue_logged(&queue, &log, "buff-2", Priority::Normal, Some("buff")));

    assert_eq!(queue.pending_ids(), vec!["loot", "buff-2"]);

    queue.start();
    wait_until(|| queue.statistics().totals().processed == 2).await;
    assert_eq!(*log.lock().unwrap(), vec!["loot", "buff-2"]);
    queue.shutdown().await;
}

#[tokio::test]
async fn test_coalescing_does_not_need_free_capacity() {
    let queue = PriorityTaskQueue::new(&config(1, 1));
    let log: Log = Arc::default();

    assert!(enqueue_logged(&queue, &log, "a", Priority::Low, Some("k")));
    assert!(enqueue_logged(&queue, &log, "b", Priority::Low, Some("k")));
    assert_eq!(queue.pending_ids(), vec!["b"]);
    assert_eq!(queue.statistics().totals().dropped, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_failures_are_contained_and_counted() {
    let queue = PriorityTaskQueue::new(&config(8, 1));
    let log: Log = Arc::default();

    queue.try_enqueue("fails", Priority::High, None, || async {
        Err(ActionError::Failed("no target".to_string()))
    });
    queue.try_enqueue("panics", Priority::High, None, || async {
        let explode = true;
        if explode {
            panic!("injector crashed");
        }
        Ok(())
    });
    enqueue_logged(&queue, &log, "survivor", Priority::Normal, None);

    queue.start();
    wait_until(|| queue.statistics().totals().processed == 1).await;

    let stats = queue.statistics();
    assert_eq!(stats.level(Priority::High).failed, 2);
    assert_eq!(stats.level(Priority::Normal).processed, 1);
    assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failure() {
    let queue = PriorityTaskQueue::new(&QueueConfig {
        task_timeout_ms: 30_000,
        ..config(8, 1)
    });

    queue.try_enqueue("hangs", Priority::Normal, None, || async {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(())
    });
    queue.start();

    tokio::time::sleep(Duration::from_secs(31)).await;
    wait_until(|| queue.statistics().totals().timed_out == 1).await;

    let totals = queue.statistics().totals();
    assert_eq!(totals.failed, 1);
    assert_eq!(totals.processed, 0);
    queue.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_workers_run_concurrently() {
    let queue = PriorityTaskQueue::new(&config(8, 2));
    for i in 0..4 {
        queue.try_enqueue(format!("sleep-{i}"), Priority::Normal, None, || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        });
    }
    queue.start();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(queue.statistics().totals().processed, 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.statistics().totals().processed, 4);
    queue.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drops_pending_and_rejects_new_work() {
    let queue = PriorityTaskQueue::new(&config(8, 1));
    let log: Log = Arc::default();

    enqueue_logged(&queue, &log, "a", Priority::Low, None);
    enqueue_logged(&queue, &log, "b", Priority::High, None);

    assert_eq!(queue.shutdown().await, 2);
    assert!(queue.is_empty());
    assert!(!enqueue_logged(&queue, &log, "late", Priority::Critical, None));

    let stats = queue.statistics();
    assert_eq!(stats.level(Priority::Low).dropped, 1);
    assert_eq!(stats.level(Priority::High).dropped, 1);
    assert_eq!(stats.level(Priority::Critical).dropped, 1);
    assert!(log.lock().unwrap().is_empty());
}
