use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Handler name for report processing jobs.
pub const PROCESS_REPORT: &str = "process_report";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(i64),

    /// The job's lock is held by another worker, or the job is no longer running.
    #[error("Job {job_id} is not held by {worker_id}")]
    NotOwned { job_id: i64, worker_id: String },

    #[error("Database error: {0}")]
    Database(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    /// Exhausted its attempts.
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Dead => "dead",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "dead" => Ok(JobStatus::Dead),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

/// A delivered or stored job. The payload is only the report id.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: i64,
    pub handler: String,
    pub report_id: String,
    pub status: JobStatus,
    /// Deliveries so far, including the current one when running.
    pub attempts: u32,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub available_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn is_final_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub running: u64,
    pub done: u64,
    pub dead: u64,
}

/// Job queue backend.
///
/// A running job whose lock expires becomes deliverable again; one that
/// has used all its attempts is instead surfaced by `reap_expired`.
pub trait JobQueue: Send + Sync {
    /// Add a job. Returns its id.
    fn enqueue(
        &self,
        handler: &str,
        report_id: &str,
        policy: RetryPolicy,
        timeout_secs: u64,
    ) -> Result<i64, QueueError>;

    /// Claim the oldest deliverable job for `worker_id`.
    fn dequeue(&self, worker_id: &str, now: DateTime<Utc>) -> Result<Option<Job>, QueueError>;

    /// Mark a job handled. `NotOwned` unless `worker_id` still holds the lock.
    fn ack(&self, job_id: i64, worker_id: &str) -> Result<(), QueueError>;

    /// Record a failed delivery. Requeues after `backoff_secs * attempts`,
    /// or marks the job dead once attempts are used up. Returns the new status.
    /// `NotOwned` unless `worker_id` still holds the lock.
    fn retry(
        &self,
        job_id: i64,
        worker_id: &str,
        error: &str,
        backoff_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<JobStatus, QueueError>;

    /// Mark running jobs whose lock expired on their final attempt as dead
    /// and return them.
    fn reap_expired(&self, now: DateTime<Utc>) -> Result<Vec<Job>, QueueError>;

    fn get(&self, job_id: i64) -> Result<Option<Job>, QueueError>;

    fn stats(&self) -> Result<QueueStats, QueueError>;
}
