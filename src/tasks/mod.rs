//! Background Tasks Module
//!
//! Long-running tasks started alongside the cache.
//!
//! # Tasks
//! - Expired sweep: frees expired entries held by the in-process store
//! - Refresh scheduler: regenerates registered entries before they expire
//! - Invalidation sink: applies invalidation requests from a channel
//! - Invalidation bridge: feeds the sink from a Redis pub/sub channel
//!   (see [`crate::store::spawn_invalidation_bridge`])

mod cleanup;
mod invalidation;
mod refresh;

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use cleanup::spawn_cleanup_task;
pub use invalidation::spawn_invalidation_sink;
pub use refresh::{spawn_refresh_task, RefreshReport, RefreshScheduler, RefreshSettings};

// == Task Handle ==
/// Owns a spawned task and its shutdown signal.
///
/// Dropping the handle aborts the task; call [`TaskHandle::shutdown`] to let
/// it finish its current iteration first.
pub struct TaskHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawns `task`, handing it the receiving half of the shutdown signal.
    pub fn spawn<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let join = tokio::spawn(task(rx));
        debug!(task = name, "background task started");

        Self {
            name,
            shutdown: Some(tx),
            join: Some(join),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signals the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            // The task may already have exited on its own.
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                if !e.is_cancelled() {
                    warn!(task = self.name, error = %e, "background task panicked");
                }
            }
        }
        debug!(task = self.name, "background task stopped");
    }

    pub fn abort(&self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_signals_task() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        let handle = TaskHandle::spawn("test", move |shutdown| async move {
            let _ = shutdown.await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(handle.name(), "test");
        assert!(!handle.is_finished());

        handle.shutdown().await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        let handle = TaskHandle::spawn("test", move |_shutdown| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stopped.load(Ordering::SeqCst));
    }
}
