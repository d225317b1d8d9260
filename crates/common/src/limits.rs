//! Admission control shared by the transcription and translation services

use crate::{AppConfig, QuickTransError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Concurrency cap and time limits for expensive model work
#[derive(Debug, Clone)]
pub struct JobLimits {
    permits: Arc<Semaphore>,
    max_jobs: usize,
    pub load_timeout: Duration,
    pub inference_timeout: Duration,
}

impl JobLimits {
    pub fn new(max_jobs: usize, load_timeout: Duration, inference_timeout: Duration) -> Self {
        let max_jobs = max_jobs.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_jobs)),
            max_jobs,
            load_timeout,
            inference_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.max_concurrent_jobs,
            config.model_load_timeout(),
            config.inference_timeout(),
        )
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a job slot
    pub async fn admit(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| QuickTransError::processing("Job queue is closed"))
    }

    /// Run a model acquisition under the load timeout
    pub async fn within_load_timeout<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.load_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(QuickTransError::model_load(format!(
                "Loading {} timed out after {}s",
                what,
                self.load_timeout.as_secs()
            ))),
        }
    }

    /// Run async inference as its own task under the inference timeout.
    ///
    /// The job slot travels with the task: on timeout the caller gets an
    /// error right away, but the slot is only freed once the work ends.
    pub async fn run_detached<T, F>(&self, what: &str, permit: OwnedSemaphorePermit, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let _permit = permit;
            work.await
        });
        self.await_job(what, handle).await
    }

    /// Run blocking inference on the blocking pool under the inference timeout.
    ///
    /// The blocking task cannot be interrupted; it keeps its job slot until
    /// it returns, even when the caller has already timed out.
    pub async fn run_blocking<T, F>(&self, what: &str, permit: OwnedSemaphorePermit, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });
        self.await_job(what, handle).await
    }

    async fn await_job<T>(&self, what: &str, handle: JoinHandle<Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.inference_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(QuickTransError::processing(format!(
                "{} task failed: {}",
                what, e
            ))),
            Err(_) => Err(QuickTransError::processing(format!(
                "{} timed out after {}s",
                what,
                self.inference_timeout.as_secs()
            ))),
        }
    }
}

impl Default for JobLimits {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
