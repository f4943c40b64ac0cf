use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::sync::oneshot;

use crate::converter::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether an entry in `self` may move to `next`.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Done)
                | (Self::Processing, Self::Failed)
        )
    }
}

/// Document handed to the converter.
#[derive(Debug)]
pub enum JobInput {
    /// Raw text posted in the request body; written to a temp file by the worker.
    Inline(String),
    /// Uploaded file already on disk. Removed when dropped.
    Upload(TempPath),
}

pub type JobResult = Result<PathBuf, ConversionError>;

/// One conversion request as it travels through the queue.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub from: String,
    pub to: String,
    pub input: JobInput,
    pub result_tx: oneshot::Sender<JobResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEntry {
    pub job_id: String,
    pub status: JobStatus,
    pub from: String,
    pub to: String,
    #[serde(skip)]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobEntry {
    pub fn queued(job_id: &str, from: &str, to: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Queued,
            from: from.to_string(),
            to: to.to_string(),
            output_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertRequest {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatsResponse {
    pub input: &'static [&'static str],
    pub output: &'static [&'static str],
}
