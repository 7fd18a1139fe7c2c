use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::BoxError;

type TaskHandle = JoinHandle<Result<(), BoxError>>;

/// Outcome of [`PendingTasks::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
}

/// Background work dispatched on behalf of contract code.
///
/// Cloning shares the same set. Any component that dispatches work holds a
/// clone; the coordinator drains it once the entry point has settled.
#[derive(Clone, Default)]
pub struct PendingTasks {
    handles: Arc<Mutex<Vec<TaskHandle>>>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` and track it until drained.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.lock().push(handle);
    }

    /// Number of tasks dispatched but not yet drained.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait for every tracked task, including tasks spawned while waiting.
    ///
    /// Failures and panics are logged and counted; they never stop the drain.
    ///
    /// The NPL subscription stays open until this returns, so handlers
    /// dispatched for messages arriving mid-drain are awaited too. The drain
    /// only finishes once peers stop sending: handlers on two nodes that
    /// answer each other indefinitely keep both executions from terminating.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return report;
            }

            debug!(pending = batch.len(), "awaiting pending tasks");
            for result in join_all(batch).await {
                match result {
                    Ok(Ok(())) => report.completed += 1,
                    Ok(Err(err)) => {
                        report.failed += 1;
                        error!(error = %err, "pending task failed");
                    }
                    Err(err) => {
                        report.failed += 1;
                        error!(error = %err, "pending task panicked");
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TaskHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PendingTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTasks")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn drain_waits_for_every_task() {
        let tasks = PendingTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        for delay in [30, 10, 20] {
            let done = Arc::clone(&done);
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(tasks.len(), 3);

        let report = tasks.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(report, DrainReport { completed: 3, failed: 0 });
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_drain() {
        let tasks = PendingTasks::new();
        tasks.spawn(async { Err::<(), BoxError>("handler failed".into()) });
        tasks.spawn(async { panic!("handler panicked") });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        });

        let report = tasks.drain().await;
        assert_eq!(report, DrainReport { completed: 1, failed: 2 });
    }

    #[tokio::test]
    async fn tasks_spawned_during_drain_are_awaited() {
        let tasks = PendingTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_tasks = tasks.clone();
        let inner_done = Arc::clone(&done);
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            inner_tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                inner_done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        let report = tasks.drain().await;
        assert_eq!(report.completed, 2);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    fn relay(tasks: PendingTasks, hops_left: usize) {
        let next = tasks.clone();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            if hops_left > 0 {
                relay(next, hops_left - 1);
            }
            Ok(())
        });
    }

    #[tokio::test]
    async fn drain_follows_reply_chains_until_quiet() {
        let tasks = PendingTasks::new();
        relay(tasks.clone(), 5);

        let report = tasks.drain().await;
        assert_eq!(report, DrainReport { completed: 6, failed: 0 });
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn drain_on_empty_set_returns_immediately() {
        let report = PendingTasks::new().drain().await;
        assert_eq!(report, DrainReport::default());
    }
}
