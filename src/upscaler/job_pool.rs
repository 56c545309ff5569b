// Bounded pool for remote jobs. Each job runs as its own tokio task and the
// time budget is enforced inside that task, so a job ends and frees its slot
// even when nobody is waiting on it any more.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::UpscaleError;

#[derive(Debug, Clone)]
pub struct JobPool {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

/// Aborts the job task when the waiting caller goes away.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl JobPool {
    pub fn new(max_concurrent_jobs: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `job` on the pool. Time spent waiting for a free slot counts
    /// against the budget. Dropping the returned future cancels the job.
    pub async fn run<F, T>(&self, job: F) -> Result<T, UpscaleError>
    where
        F: Future<Output = Result<T, UpscaleError>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let budget = self.timeout;
        let mut guard = AbortOnDrop(tokio::spawn(async move {
            let bounded = tokio::time::timeout(budget, async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| UpscaleError::RemoteService(format!("Job pool closed: {}", e)))?;
                debug!("Remote job started");
                job.await
            });

            match bounded.await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Remote job exceeded {}s budget, aborted", budget.as_secs());
                    Err(UpscaleError::RemoteService(format!(
                        "Remote job timed out after {}s",
                        budget.as_secs()
                    )))
                }
            }
        }));

        match (&mut guard.0).await {
            Ok(result) => result,
            Err(join_err) => Err(UpscaleError::RemoteService(format!(
                "Remote job task failed: {}",
                join_err
            ))),
        }
    }
}
