//! A bounded pool of tokio tasks.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

#[cfg(test)]
#[path = "worker_pool_tests.rs"]
mod tests;

/// Runs at most `size` jobs at once.
///
/// [`WorkerPool::spawn`] waits for a free slot before starting the job, so a
/// dispatch loop feeding the pool slows down to the pace of the workers.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl WorkerPool {
    /// Creates a pool. A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Starts `job` as soon as a slot is free.
    pub async fn spawn<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            // The semaphore is never closed while the pool is alive.
            return;
        };
        self.tasks.spawn(async move {
            job.await;
            drop(permit);
        });
    }

    /// Number of jobs started and not yet collected by [`WorkerPool::wait`].
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for every job. Returns how many of them panicked.
    pub async fn wait(mut self) -> usize {
        let mut panicked = 0;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
                panicked += 1;
            }
        }
        panicked
    }
}
