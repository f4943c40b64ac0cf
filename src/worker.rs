use std::{sync::Arc, time::Duration};

use tempfile::TempPath;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    artifact_store::{delete_file_if_exists, write_temp_input},
    converter::{ConversionError, Converter},
    formats::extension_for,
    models::{Job, JobInput, JobResult, JobStatus},
    queue::WorkQueue,
    store::{JobStore, StoreError},
};

pub fn spawn_workers(
    count: usize,
    queue: &WorkQueue,
    store: &Arc<JobStore>,
    converter: &Arc<Converter>,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let queue = queue.clone();
            let store = store.clone();
            let converter = converter.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    // only the wait for work is cancellable; a running job always finishes
                    let job = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        job = queue.dequeue() => match job {
                            Some(job) => job,
                            None => break,
                        },
                    };
                    process_job(&store, &converter, job).await;
                }
                info!(worker_id, "Conversion worker stopped");
            })
        })
        .collect()
}

pub fn spawn_cleanup_worker(
    store: Arc<JobStore>,
    interval: Duration,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let report = store.sweep(retention).await;
                    if report.removed > 0 || report.delete_failures > 0 {
                        info!(
                            removed = report.removed,
                            files_deleted = report.files_deleted,
                            delete_failures = report.delete_failures,
                            "Swept expired jobs"
                        );
                    }
                }
            }
        }
        info!("Cleanup worker stopped");
    })
}

pub async fn process_job(store: &JobStore, converter: &Converter, job: Job) {
    let Job {
        id,
        from,
        to,
        input,
        result_tx,
    } = job;

    info!(job_id = %id, from = %from, to = %to, "Worker picked conversion job");
    if let Err(err) = store
        .set_status(&id, JobStatus::Processing, None, None)
        .await
    {
        warn!(job_id = %id, "Could not mark job processing: {err}");
    }

    let result = run_conversion(converter, &id, &from, &to, input).await;

    match &result {
        Ok(output_path) => {
            let update = store
                .set_status(&id, JobStatus::Done, Some(output_path.clone()), None)
                .await;
            if let Err(err) = update {
                warn!(job_id = %id, "Could not mark job done: {err}");
                // nobody can download it without an entry
                if matches!(err, StoreError::NotFound(_)) {
                    if let Err(err) = delete_file_if_exists(output_path).await {
                        warn!(job_id = %id, "Failed to remove orphaned output: {err:#}");
                    }
                }
            } else {
                info!(job_id = %id, output = %output_path.display(), "Conversion job completed");
            }
        }
        Err(err) => {
            error!(job_id = %id, "Conversion job failed: {err}");
            if let Err(err) = store
                .set_status(&id, JobStatus::Failed, None, Some(err.to_string()))
                .await
            {
                warn!(job_id = %id, "Could not mark job failed: {err}");
            }
        }
    }

    if result_tx.send(result).is_err() {
        info!(job_id = %id, "Requester stopped waiting; result kept in store only");
    }
}

async fn run_conversion(
    converter: &Converter,
    job_id: &str,
    from: &str,
    to: &str,
    input: JobInput,
) -> JobResult {
    let input_path = match input {
        JobInput::Upload(path) => path,
        JobInput::Inline(content) => materialize_inline(converter, from, content).await?,
    };

    let result = converter.convert(job_id, from, to, &input_path).await;

    let shown = input_path.display().to_string();
    if let Err(err) = input_path.close() {
        warn!(job_id = %job_id, "Failed to remove temp input {shown}: {err}");
    }
    result
}

async fn materialize_inline(
    converter: &Converter,
    from: &str,
    content: String,
) -> Result<TempPath, ConversionError> {
    let work_root = converter.work_root().to_path_buf();
    let suffix = extension_for(from);
    tokio::task::spawn_blocking(move || write_temp_input(&work_root, suffix, content.as_bytes()))
        .await
        .map_err(|err| ConversionError::Input(err.to_string()))?
        .map_err(|err| ConversionError::Input(format!("{err:#}")))
}
