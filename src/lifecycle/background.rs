//! Fire-and-forget work that runs after the response is sent.

use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;

use crate::observability::metrics;

/// Scheduler for deferred work (cache writes, revalidation).
///
/// A task's error or panic stays inside its own tokio task; the request
/// that scheduled it never observes it.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F, E>(&self, task: &'static str, future: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let inner = self.tracker.spawn(future);
        self.tracker.spawn(async move {
            match inner.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    metrics::record_background_failure(task);
                    tracing::warn!(task, error = %e, "Background task failed");
                }
                Err(e) => {
                    metrics::record_background_failure(task);
                    tracing::error!(task, error = %e, "Background task panicked");
                }
            }
        });
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Close the tracker and wait for running tasks.
    /// Returns `false` if the deadline elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_waits_for_tasks() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        tasks.spawn("test", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<(), String>(())
        });
        assert!(tasks.drain(Duration::from_secs(1)).await);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_isolated() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("fails", async { Err::<(), _>("boom") });
        tasks.spawn("panics", async {
            if true {
                panic!("deferred panic");
            }
            Ok::<(), String>(())
        });
        assert!(tasks.drain(Duration::from_secs(1)).await);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_drain_deadline() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), String>(())
        });
        assert!(!tasks.drain(Duration::from_millis(10)).await);
    }
}
