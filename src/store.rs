use std::{collections::HashMap, path::PathBuf, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    artifact_store::delete_file_if_exists,
    models::{JobEntry, JobStatus},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown job id: {0}")]
    NotFound(String),
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub files_deleted: usize,
    pub delete_failures: usize,
}

/// In-memory job table. The lock is only held for single map operations.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobEntry>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, entry: JobEntry) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(entry.job_id.clone(), entry);
    }

    pub async fn get(&self, job_id: &str) -> Option<JobEntry> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).cloned()
    }

    pub async fn remove(&self, job_id: &str) -> Option<JobEntry> {
        let mut jobs = self.jobs.write().await;
        jobs.remove(job_id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn set_status(
        &self,
        job_id: &str,
        status: JobStatus,
        output_path: Option<PathBuf>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return Err(StoreError::NotFound(job_id.to_string()));
        };

        if !job.status.can_advance_to(status) {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status.as_str(),
                to: status.as_str(),
            });
        }

        job.status = status;
        job.updated_at = Utc::now();
        match status {
            JobStatus::Done => {
                job.output_path = output_path.filter(|p| !p.as_os_str().is_empty());
                job.error = None;
            }
            JobStatus::Failed => {
                job.output_path = None;
                job.error = error;
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }
        Ok(())
    }

    /// Drops every entry older than `max_age` and deletes its output file.
    pub async fn sweep(&self, max_age: Duration) -> SweepReport {
        let max_age = ChronoDuration::from_std(max_age).unwrap_or(ChronoDuration::MAX);
        let now = Utc::now();
        let mut report = SweepReport::default();
        let mut files_to_delete = Vec::new();

        {
            let mut jobs = self.jobs.write().await;
            jobs.retain(|job_id, job| {
                if now - job.created_at <= max_age {
                    return true;
                }
                info!(job_id = %job_id, status = job.status.as_str(), "Expiring job");
                if let Some(path) = job.output_path.take() {
                    files_to_delete.push(path);
                }
                report.removed += 1;
                false
            });
        }

        for path in files_to_delete {
            match delete_file_if_exists(&path).await {
                Ok(()) => report.files_deleted += 1,
                Err(err) => {
                    report.delete_failures += 1;
                    warn!("Failed to delete expired output {}: {err:#}", path.display());
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use chrono::{Duration as ChronoDuration, Utc};

    use super::{JobStore, StoreError};
    use crate::models::{JobEntry, JobStatus};

    #[tokio::test]
    async fn transitions_are_monotonic() {
        let store = JobStore::new();
        store.register(JobEntry::queued("a", "markdown", "html")).await;

        let skipped = store.set_status("a", JobStatus::Done, None, None).await;
        assert!(matches!(skipped, Err(StoreError::InvalidTransition { .. })));

        store
            .set_status("a", JobStatus::Processing, None, None)
            .await
            .expect("queued -> processing");
        store
            .set_status("a", JobStatus::Failed, None, Some("boom".to_string()))
            .await
            .expect("processing -> failed");

        let regress = store.set_status("a", JobStatus::Processing, None, None).await;
        assert!(regress.is_err());

        let entry = store.get("a").await.expect("entry");
        assert_eq!(entry.status, JobStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("boom"));
        assert!(entry.output_path.is_none());
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let store = JobStore::new();
        let err = store
            .set_status("missing", JobStatus::Processing, None, None)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("missing".to_string()));
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries_and_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.html");
        std::fs::write(&output, "<h1>Hi</h1>").expect("write output");

        let store = JobStore::new();
        let mut old = JobEntry::queued("old", "markdown", "html");
        old.created_at = Utc::now() - ChronoDuration::minutes(31);
        store.register(old).await;
        store
            .set_status("old", JobStatus::Processing, None, None)
            .await
            .unwrap();
        store
            .set_status("old", JobStatus::Done, Some(output.clone()), None)
            .await
            .unwrap();

        let mut abandoned = JobEntry::queued("abandoned", "markdown", "html");
        abandoned.created_at = Utc::now() - ChronoDuration::hours(2);
        store.register(abandoned).await;

        store.register(JobEntry::queued("fresh", "markdown", "html")).await;

        let report = store.sweep(Duration::from_secs(30 * 60)).await;
        assert_eq!(report.removed, 2);
        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.delete_failures, 0);

        assert!(!output.exists());
        assert!(store.get("old").await.is_none());
        assert!(store.get("abandoned").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn sweep_tolerates_missing_output_file() {
        let store = JobStore::new();
        let mut entry = JobEntry::queued("gone", "markdown", "html");
        entry.created_at = Utc::now() - ChronoDuration::hours(1);
        entry.status = JobStatus::Done;
        entry.output_path = Some(PathBuf::from("/nonexistent/convertly/gone.html"));
        store.register(entry).await;

        let report = store.sweep(Duration::from_secs(60)).await;
        assert_eq!(report.removed, 1);
        assert_eq!(store.len().await, 0);
    }
}
