//! Report storage trait and errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{
    Analysis, Completion, CreateReportRequest, Finding, Report, ReportFilter, ReportStatus, Scope,
};

/// Error type for report operations.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Absent, outside the caller's scope, or soft-deleted.
    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Report {id} is not ready: status is {status}")]
    NotReady { id: String, status: ReportStatus },

    #[error("Report {id} conflict: {reason}")]
    Conflict { id: String, reason: String },

    #[error("Cannot {operation} report {id}: status is {status}")]
    InvalidState {
        id: String,
        status: ReportStatus,
        operation: String,
    },

    /// The processing lease was taken over or released before the write.
    #[error("Processing lease lost for report {0}")]
    LeaseLost(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for report storage backends.
///
/// Every mutation is a single conditional statement or one transaction so
/// concurrent workers and lifecycle operations never see partial state.
pub trait ReportStore: Send + Sync {
    /// Create a new report in PROCESSING.
    fn create(&self, request: CreateReportRequest) -> Result<Report, ReportError>;

    /// Get a report by ID regardless of scope or deletion.
    fn get(&self, id: &str) -> Result<Option<Report>, ReportError>;

    /// Get a non-deleted report visible in `scope`.
    fn find_in_scope(&self, id: &str, scope: &Scope) -> Result<Option<Report>, ReportError>;

    /// List non-deleted reports matching the filter, newest first.
    fn list(&self, filter: &ReportFilter) -> Result<Vec<Report>, ReportError>;

    /// Count non-deleted reports matching the filter.
    fn count(&self, filter: &ReportFilter) -> Result<i64, ReportError>;

    /// Take the processing lease on a PROCESSING, non-deleted report whose
    /// lease is free or expired. Returns the claimed report, or None when
    /// another owner holds it or the report is not claimable.
    fn try_claim(
        &self,
        id: &str,
        owner: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Report>, ReportError>;

    /// Give the lease back without changing status. Returns false if `owner`
    /// no longer held it.
    fn release_claim(&self, id: &str, owner: &str) -> Result<bool, ReportError>;

    /// Persist DONE together with the analysis and its findings, replacing any
    /// previous analysis. Fails with `LeaseLost` if `owner` no longer holds
    /// the lease; nothing is written in that case.
    fn complete(
        &self,
        id: &str,
        owner: &str,
        completion: &Completion,
        now: DateTime<Utc>,
    ) -> Result<Analysis, ReportError>;

    /// Persist FAILED with a sanitized error message. With an owner the update
    /// is conditional on holding the lease; without one it applies to any
    /// PROCESSING report. Returns whether a row changed.
    fn fail(
        &self,
        id: &str,
        owner: Option<&str>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ReportError>;

    /// Move a terminal, non-deleted report in `scope` back to PROCESSING.
    fn reset_for_reprocess(
        &self,
        id: &str,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<Report, ReportError>;

    /// Set `deleted_at`. `Conflict` if already deleted, `NotFound` if absent
    /// or out of scope.
    fn soft_delete(
        &self,
        id: &str,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<Report, ReportError>;

    /// Soft-deleted reports whose `deleted_at` is strictly before `cutoff`.
    fn purge_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Report>, ReportError>;

    /// Remove a soft-deleted row and its analyses. Returns false if the row
    /// is gone or no longer soft-deleted.
    fn delete_purged(&self, id: &str) -> Result<bool, ReportError>;

    /// The authoritative (most recent) analysis of a report.
    fn latest_analysis(&self, report_id: &str) -> Result<Option<Analysis>, ReportError>;

    /// All analyses stored for a report.
    fn analyses(&self, report_id: &str) -> Result<Vec<Analysis>, ReportError>;

    /// Findings of one analysis in the order the engine reported them.
    fn findings(&self, analysis_id: &str) -> Result<Vec<Finding>, ReportError>;
}
