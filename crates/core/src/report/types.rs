//! Core report data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing status of a report.
///
/// Deletion is tracked separately through `deleted_at`; it is never a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Processing,
    Done,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }

    /// Whether processing has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROCESSING" => Ok(Self::Processing),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown report status: {}", other)),
        }
    }
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Points deducted from the score for one finding of this severity.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Critical => 20,
            Self::High => 12,
            Self::Medium => 6,
            Self::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// A submitted inspection document and its processing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    /// Owning tenant; never changes after creation.
    pub tenant_id: String,
    pub uploaded_by: String,
    pub filename: String,
    pub status: ReportStatus,
    /// 0-100, present only when DONE.
    pub score: Option<u8>,
    pub finding_count: u32,
    pub summary: Option<String>,
    /// Object key of the uploaded source document.
    pub source_key: String,
    /// Object key of the generated conclusion document.
    pub output_key: Option<String>,
    /// SHA-256 hex of the bytes stored at `output_key`.
    pub checksum: Option<String>,
    pub byte_size: Option<u64>,
    /// Sanitized failure cause, present only when FAILED.
    pub error_message: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub lease_owner: Option<String>,
    #[serde(skip)]
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether a conclusion document can be handed out for this report.
    pub fn has_artifact(&self) -> bool {
        self.status == ReportStatus::Done && self.output_key.is_some() && self.checksum.is_some()
    }

    pub fn visible_to(&self, scope: &Scope) -> bool {
        match scope {
            Scope::All => true,
            Scope::Tenant(tenant_id) => &self.tenant_id == tenant_id,
        }
    }
}

/// One analysis run over a report. Only the latest finished run is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: String,
    pub report_id: String,
    pub engine: String,
    pub engine_version: String,
    pub score: u8,
    /// Score reported by the model itself, when an AI engine ran.
    pub model_score: Option<u8>,
    pub passed_rules: u32,
    pub failed_rules: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// A persisted finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub analysis_id: String,
    pub code: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// A finding produced by an analysis engine, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingDraft {
    pub code: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl FindingDraft {
    pub fn new(code: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            suggestion: None,
            evidence: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// Request to create a new report.
#[derive(Debug, Clone)]
pub struct CreateReportRequest {
    /// Pre-generated id; the source key is derived from it before the row exists.
    pub id: String,
    pub tenant_id: String,
    pub uploaded_by: String,
    pub filename: String,
    pub source_key: String,
}

/// Everything persisted when a report transitions to DONE.
#[derive(Debug, Clone)]
pub struct Completion {
    pub engine: String,
    pub engine_version: String,
    pub score: u8,
    pub model_score: Option<u8>,
    pub passed_rules: u32,
    pub failed_rules: u32,
    pub summary: String,
    pub findings: Vec<FindingDraft>,
    pub output_key: String,
    pub checksum: String,
    pub byte_size: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Which reports a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Tenant(String),
    All,
}

/// The authenticated caller of a read or lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub tenant_id: String,
    pub elevated: bool,
}

impl Requester {
    pub fn scope(&self) -> Scope {
        if self.elevated {
            Scope::All
        } else {
            Scope::Tenant(self.tenant_id.clone())
        }
    }
}

/// Filter for listing reports. Soft-deleted reports are never listed.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub scope: Scope,
    pub status: Option<ReportStatus>,
    pub uploaded_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ReportFilter {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            status: None,
            uploaded_by: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_uploaded_by(mut self, uploaded_by: impl Into<String>) -> Self {
        self.uploaded_by = Some(uploaded_by.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

pub fn new_report_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
