//! Jobs, their lifecycle, and queue errors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::types::ReconciliationError;

/// Kind of background work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Parse an uploaded file into records
    FileProcessing,
    /// Reconcile an upload's records against the system of record
    Reconciliation,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::FileProcessing => f.write_str("file-processing"),
            JobType::Reconciliation => f.write_str("reconciliation"),
        }
    }
}

/// Parameters of a job; external entities are referenced by id only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobPayload {
    #[serde(rename_all = "camelCase")]
    FileProcessing { job_id: String },
    #[serde(rename_all = "camelCase")]
    Reconciliation {
        upload_job_id: String,
        user_id: String,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::FileProcessing { .. } => JobType::FileProcessing,
            JobPayload::Reconciliation { .. } => JobType::Reconciliation,
        }
    }
}

/// Lifecycle state of a job: `waiting -> processing -> completed | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A unit of background work owned by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason, set only when `status` is `Failed`
    pub error: Option<String>,
}

impl Job {
    /// Create a new waiting job
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            status: JobStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, outcome: &Result<(), JobError>) {
        match outcome {
            Ok(()) => self.status = JobStatus::Completed,
            Err(e) => {
                self.status = JobStatus::Failed;
                self.error = Some(e.to_string());
            }
        }
        self.finished_at = Some(Utc::now());
    }
}

/// Point-in-time job counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    /// True when nothing is waiting or running
    pub fn is_idle(&self) -> bool {
        self.waiting == 0 && self.active == 0
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("No handler registered for job type '{0}'")]
    UnknownJobType(JobType),
    #[error("Handler failed: {0}")]
    HandlerFailure(String),
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl From<ReconciliationError> for JobError {
    fn from(err: ReconciliationError) -> Self {
        JobError::HandlerFailure(err.to_string())
    }
}

/// Errors returned to callers submitting work
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("Job queue has been shut down")]
    ShutDown,
}
