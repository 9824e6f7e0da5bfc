//! Types for the report pipeline and worker pool.

use serde::Serialize;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::artifact::ArtifactError;
use crate::extract::ExtractionError;
use crate::queue::{QueueError, QueueStats};
use crate::report::ReportError;
use crate::storage::StorageError;

/// Errors raised by a pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source object missing: {0}")]
    SourceMissing(String),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("artifact rendering failed: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("upload of {0} was not confirmed")]
    UploadNotConfirmed(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("report store error: {0}")]
    Store(#[from] ReportError),
}

impl PipelineError {
    /// Infrastructure failures that a later delivery may not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::UploadNotConfirmed(_) => true,
            PipelineError::Storage(StorageError::InvalidKey(_)) => false,
            PipelineError::Storage(_) => true,
            PipelineError::Store(ReportError::Database(_)) => true,
            _ => false,
        }
    }
}

/// Which delivery of a job is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub max: u32,
}

impl Attempt {
    pub fn new(number: u32, max: u32) -> Self {
        Self {
            number: number.max(1),
            max: max.max(1),
        }
    }

    /// A one-shot run with no redelivery.
    pub fn single() -> Self {
        Self::new(1, 1)
    }

    pub fn is_final(&self) -> bool {
        self.number >= self.max
    }
}

/// Result of processing one delivered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Report persisted as DONE.
    Done { score: u8 },
    /// Report persisted as FAILED; the job is handled.
    Failed { error: String },
    /// Nothing to do: already terminal, or processed by another worker.
    Skipped { reason: String },
    /// The report no longer exists or was deleted.
    Dropped { reason: String },
    /// Transient failure; the lease was released and the job should be redelivered.
    Retry { error: String },
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Done { .. } => "done",
            ProcessOutcome::Failed { .. } => "failed",
            ProcessOutcome::Skipped { .. } => "skipped",
            ProcessOutcome::Dropped { .. } => "dropped",
            ProcessOutcome::Retry { .. } => "retry",
        }
    }

    /// Whether the queue should redeliver the job.
    pub fn needs_retry(&self) -> bool {
        matches!(self, ProcessOutcome::Retry { .. })
    }
}

/// Errors from the worker loop itself.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Snapshot of the worker pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub workers: usize,
    pub active_jobs: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    pub queue: QueueStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_final() {
        assert!(Attempt::single().is_final());
        assert!(!Attempt::new(1, 3).is_final());
        assert!(Attempt::new(3, 3).is_final());
        assert_eq!(Attempt::new(0, 0), Attempt::single());
    }

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::UploadNotConfirmed("k".into()).is_transient());
        assert!(PipelineError::Storage(StorageError::Io("disk".into())).is_transient());
        assert!(!PipelineError::Storage(StorageError::InvalidKey("..".into())).is_transient());
        assert!(PipelineError::Store(ReportError::Database("locked".into())).is_transient());
        assert!(!PipelineError::Extraction(ExtractionError::Empty).is_transient());
        assert!(!PipelineError::SourceMissing("k".into()).is_transient());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ProcessOutcome::Done { score: 90 }.label(), "done");
        assert!(ProcessOutcome::Retry { error: "x".into() }.needs_retry());
        assert!(!ProcessOutcome::Failed { error: "x".into() }.needs_retry());
    }
}
