//! Reports, their analyses and findings.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteReportStore;
pub use store::{ReportError, ReportStore};
pub use types::{
    new_report_id, Analysis, Completion, CreateReportRequest, Finding, FindingDraft, Report,
    ReportFilter, ReportStatus, Requester, Scope, Severity,
};
