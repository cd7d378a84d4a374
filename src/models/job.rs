use std::path::PathBuf;

use serde::Deserialize;
use strum::Display;

/// Opaque job identifier assigned by the detection service.
pub type JobId = i64;

/// Local view of a remote job's lifecycle.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// One submitted image and the job the service created for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub image_path: PathBuf,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl Job {
    pub fn pending(id: JobId, image_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            image_path: image_path.into(),
            status: JobStatus::Pending,
            error: None,
        }
    }
}

/// Status string reported by `GET /jobs/{id}`.
#[derive(Debug, Clone, Copy, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RemoteStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}
