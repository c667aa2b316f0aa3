//! Controller lifecycle: cache priming, worker pool, shutdown.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;

use crate::error::OperatorResult;
use crate::queue::{WorkItem, WorkQueue};
use crate::reconciler::Reconciler;

/// Runs the worker pool that drains the work queue through the reconciler.
pub struct Controller {
    queue: WorkQueue,
    reconciler: Arc<Reconciler>,
}

impl Controller {
    /// Wire the controller to its queue and reconciler.
    pub fn new(queue: WorkQueue, reconciler: Arc<Reconciler>) -> Self {
        Self { queue, reconciler }
    }

    /// Wait for the parent cache to finish its initial list, then run
    /// `workers` concurrent workers until the queue shuts down.
    pub async fn run(&self, workers: usize) -> OperatorResult<()> {
        tracing::info!("starting submarine controller");

        tracing::info!("waiting for informer caches to sync");
        while !self.reconciler.caches().submarines.has_synced() {
            if self.queue.is_shutting_down() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let workers = workers.max(1);
        tracing::info!(workers, "starting workers");

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let queue = self.queue.clone();
            let reconciler = Arc::clone(&self.reconciler);
            pool.spawn(worker_loop(worker, queue, reconciler));
        }

        while pool.join_next().await.is_some() {}
        tracing::info!("workers stopped");
        Ok(())
    }
}

async fn worker_loop(worker: usize, queue: WorkQueue, reconciler: Arc<Reconciler>) {
    while let Some(item) = queue.get().await {
        process(&queue, &reconciler, item).await;
    }
    tracing::debug!(worker, "worker shutting down");
}

/// Run one item through the reconciler and translate the outcome into queue
/// bookkeeping. Panics are caught and treated like transient failures so a
/// poisoned key cannot take a worker down.
async fn process(queue: &WorkQueue, reconciler: &Arc<Reconciler>, item: WorkItem) {
    let outcome = AssertUnwindSafe(reconciler.sync(&item)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {
            queue.forget(&item.key);
            tracing::info!(key = %item.key, "successfully synced");
        }
        Ok(Err(e)) if e.requeues() => {
            tracing::warn!(key = %item.key, error = %e, "sync failed, requeuing");
            queue.add_rate_limited(item.clone());
        }
        Ok(Err(e)) => {
            tracing::error!(key = %item.key, error = %e, "dropping invalid work item");
            queue.forget(&item.key);
        }
        Err(_) => {
            tracing::error!(key = %item.key, "sync panicked, requeuing");
            queue.add_rate_limited(item.clone());
        }
    }

    queue.done(&item.key);
}
