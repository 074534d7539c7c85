//! Scheduler background loop.
//!
//! Wakes on a fixed interval, moves every due task out of the store's
//! active set, and hands each one to the executor. There is no queue of
//! its own: due tasks are identified freshly from the active set on every
//! tick, so a task fires within one tick interval of becoming due.

use crate::executor::Executor;
use crate::store::TaskStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Background loop that fires due tasks.
pub struct Scheduler {
    store: Arc<TaskStore>,
    executor: Arc<Executor>,
    tick_interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler ticking every `tick_interval` until `cancel`
    /// fires.
    #[must_use]
    pub fn new(
        store: Arc<TaskStore>,
        executor: Arc<Executor>,
        tick_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            executor,
            tick_interval,
            cancel,
        }
    }

    /// Start the scheduler background loop.
    pub fn run(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("scheduler started");
            let mut interval = tokio::time::interval(self.tick_interval);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = interval.tick() => self.tick(),
                }
            }
            info!("scheduler stopped");
        })
    }

    /// Execute one scheduler tick: dequeue and dispatch every due task.
    fn tick(&self) {
        let due = self.store.take_due(Utc::now());
        for task in due {
            debug!(task_id = %task.id, command = %task.command, "task due");
            self.executor.dispatch(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type SchedulerFixture = (Arc<TaskStore>, Arc<Executor>, CancellationToken, tempfile::TempDir);

    fn scheduler_fixture() -> SchedulerFixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(TaskStore::open(&dir.path().join("state"), 100));
        let executor = Arc::new(Executor::new(
            Arc::clone(&store),
            dir.path().join("artifacts"),
            4,
        ));
        (store, executor, CancellationToken::new(), dir)
    }

    #[tokio::test]
    async fn due_task_is_fired_and_lands_in_history() {
        let (store, executor, cancel, _dir) = scheduler_fixture();
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&executor),
            Duration::from_millis(50),
            cancel.clone(),
        );
        let handle = scheduler.run();

        let (id, _) = store.schedule("echo fired", 0).expect("schedule");

        let mut fired = false;
        for _ in 0..100 {
            if store.list_history(10).iter().any(|t| t.id == id) {
                fired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(fired, "due task should complete within the polling window");
        assert!(store.list_active().is_empty());

        cancel.cancel();
        handle.await.expect("scheduler task join");
    }

    #[tokio::test]
    async fn future_task_is_left_alone() {
        let (store, executor, cancel, _dir) = scheduler_fixture();
        let scheduler = Scheduler::new(
            Arc::clone(&store),
            executor,
            Duration::from_millis(50),
            cancel.clone(),
        );
        let handle = scheduler.run();

        store.schedule("echo later", 3600).expect("schedule");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.list_active().len(), 1);
        assert!(store.list_history(10).is_empty());

        cancel.cancel();
        handle.await.expect("scheduler task join");
    }

    #[tokio::test]
    async fn cancelled_scheduler_stops_promptly() {
        let (store, executor, cancel, _dir) = scheduler_fixture();
        let scheduler = Scheduler::new(store, executor, Duration::from_secs(60), cancel.clone());
        let handle = scheduler.run();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop well before its next tick")
            .expect("scheduler task join");
    }
}
