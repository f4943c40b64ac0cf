use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    converter::Converter,
    models::{Job, JobEntry, JobInput, JobResult},
    queue::{QueueError, WorkQueue},
    store::JobStore,
    worker::{spawn_cleanup_worker, spawn_workers},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Queue full, try again later")]
    QueueFull,
    #[error("Service is shutting down")]
    ShuttingDown,
}

/// How a synchronous conversion request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done { job_id: String },
    Failed { job_id: String, error: String },
    /// The wait expired; the job keeps running and its entry stays authoritative.
    TimedOut { job_id: String },
}

/// Owns the queue, the job store and the background tasks serving them.
pub struct ConversionService {
    config: Config,
    store: Arc<JobStore>,
    queue: WorkQueue,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ConversionService {
    /// Starts the worker pool and the cleanup sweeper. Needs a tokio runtime.
    pub fn start(config: Config) -> Arc<Self> {
        let store = Arc::new(JobStore::new());
        let queue = WorkQueue::new(config.queue_capacity);
        let converter = Arc::new(Converter::from_config(&config));
        let shutdown = CancellationToken::new();

        let mut handles = spawn_workers(
            config.worker_count,
            &queue,
            &store,
            &converter,
            &shutdown,
        );
        handles.push(spawn_cleanup_worker(
            store.clone(),
            config.sweep_interval,
            config.retention,
            shutdown.clone(),
        ));

        info!(
            workers = config.worker_count,
            queue_capacity = queue.capacity(),
            work_root = %config.work_root.display(),
            converter = %config.converter_bin,
            "Conversion service started"
        );

        Arc::new(Self {
            config,
            store,
            queue,
            shutdown,
            handles: Mutex::new(handles),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Registers and enqueues a job without waiting for it.
    pub async fn submit(
        &self,
        from: String,
        to: String,
        input: JobInput,
    ) -> Result<(String, oneshot::Receiver<JobResult>), SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        let job_id = Uuid::new_v4().to_string();
        let (result_tx, result_rx) = oneshot::channel();

        self.store
            .register(JobEntry::queued(&job_id, &from, &to))
            .await;

        let job = Job {
            id: job_id.clone(),
            from,
            to,
            input,
            result_tx,
        };

        if let Err(err) = self.queue.enqueue(job) {
            // never leave a queued entry no worker will pick up
            self.store.remove(&job_id).await;
            warn!(job_id = %job_id, "Rejected conversion job: {err}");
            return Err(match err {
                QueueError::Full(_) => SubmitError::QueueFull,
                QueueError::Closed(_) => SubmitError::ShuttingDown,
            });
        }

        info!(job_id = %job_id, queued = self.queue.len(), "Conversion job queued");
        Ok((job_id, result_rx))
    }

    /// Submits a job and waits up to the configured bound for its result.
    /// Dropping the returned future stops the wait, never the job.
    pub async fn submit_and_wait(
        &self,
        from: String,
        to: String,
        input: JobInput,
    ) -> Result<JobOutcome, SubmitError> {
        let (job_id, result_rx) = self.submit(from, to, input).await?;

        let outcome = match time::timeout(self.config.wait_timeout, result_rx).await {
            Ok(Ok(Ok(_))) => JobOutcome::Done { job_id },
            Ok(Ok(Err(err))) => JobOutcome::Failed {
                job_id,
                error: err.to_string(),
            },
            Ok(Err(_)) => JobOutcome::Failed {
                job_id,
                error: "Job was dropped before completion".to_string(),
            },
            Err(_) => {
                info!(job_id = %job_id, "Conversion wait timed out; job continues in background");
                JobOutcome::TimedOut { job_id }
            }
        };
        Ok(outcome)
    }

    /// Stops accepting work, lets in-flight jobs finish and joins every
    /// background task. Jobs still queued are dropped along with their entries.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.queue.close();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(err) = handle.await {
                warn!("Background task ended abnormally: {err}");
            }
        }

        let mut dropped = 0usize;
        while let Some(job) = self.queue.try_dequeue() {
            self.store.remove(&job.id).await;
            dropped += 1;
        }
        info!(
            dropped,
            remaining_jobs = self.store.len().await,
            "Conversion service stopped"
        );
    }
}
