use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger action recorded for each audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ServiceStarted,
    ServiceStopped,
    Upload,
    ProcessStart,
    ProcessDone,
    ProcessFail,
    ReportDownload,
    SoftDelete,
    NotificationSent,
    ReportPurge,
    ReportReprocess,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceStarted => "SERVICE_STARTED",
            Self::ServiceStopped => "SERVICE_STOPPED",
            Self::Upload => "UPLOAD",
            Self::ProcessStart => "PROCESS_START",
            Self::ProcessDone => "PROCESS_DONE",
            Self::ProcessFail => "PROCESS_FAIL",
            Self::ReportDownload => "REPORT_DOWNLOAD",
            Self::SoftDelete => "SOFT_DELETE",
            Self::NotificationSent => "NOTIFICATION_SENT",
            Self::ReportPurge => "REPORT_PURGE",
            Self::ReportReprocess => "REPORT_REPROCESS",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Ingestion
    ReportUploaded {
        report_id: String,
        tenant_id: String,
        uploaded_by: String,
        filename: String,
        size_bytes: u64,
    },
    ReportReprocessRequested {
        report_id: String,
        tenant_id: String,
        requested_by: String,
        previous_status: String,
    },

    // Processing
    ProcessingStarted {
        report_id: String,
        tenant_id: String,
        worker_id: String,
        attempt: u32,
    },
    ProcessingCompleted {
        report_id: String,
        tenant_id: String,
        engine: String,
        score: u8,
        finding_count: usize,
        checksum: String,
    },
    ProcessingFailed {
        report_id: String,
        tenant_id: String,
        error: String,
        attempt: u32,
    },
    NotificationSent {
        report_id: String,
        tenant_id: String,
        outcome: String,
        delivered: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // Retrieval and lifecycle
    ReportDownloaded {
        report_id: String,
        tenant_id: String,
        user_id: String,
    },
    ReportSoftDeleted {
        report_id: String,
        tenant_id: String,
        deleted_by: String,
    },
    ReportPurged {
        report_id: String,
        tenant_id: String,
        objects_removed: Vec<String>,
    },
}

impl AuditEvent {
    pub fn action(&self) -> AuditAction {
        match self {
            Self::ServiceStarted { .. } => AuditAction::ServiceStarted,
            Self::ServiceStopped { .. } => AuditAction::ServiceStopped,
            Self::ReportUploaded { .. } => AuditAction::Upload,
            Self::ReportReprocessRequested { .. } => AuditAction::ReportReprocess,
            Self::ProcessingStarted { .. } => AuditAction::ProcessStart,
            Self::ProcessingCompleted { .. } => AuditAction::ProcessDone,
            Self::ProcessingFailed { .. } => AuditAction::ProcessFail,
            Self::NotificationSent { .. } => AuditAction::NotificationSent,
            Self::ReportDownloaded { .. } => AuditAction::ReportDownload,
            Self::ReportSoftDeleted { .. } => AuditAction::SoftDelete,
            Self::ReportPurged { .. } => AuditAction::ReportPurge,
        }
    }

    pub fn report_id(&self) -> Option<&str> {
        match self {
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
            Self::ReportUploaded { report_id, .. }
            | Self::ReportReprocessRequested { report_id, .. }
            | Self::ProcessingStarted { report_id, .. }
            | Self::ProcessingCompleted { report_id, .. }
            | Self::ProcessingFailed { report_id, .. }
            | Self::NotificationSent { report_id, .. }
            | Self::ReportDownloaded { report_id, .. }
            | Self::ReportSoftDeleted { report_id, .. }
            | Self::ReportPurged { report_id, .. } => Some(report_id),
        }
    }

    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
            Self::ReportUploaded { tenant_id, .. }
            | Self::ReportReprocessRequested { tenant_id, .. }
            | Self::ProcessingStarted { tenant_id, .. }
            | Self::ProcessingCompleted { tenant_id, .. }
            | Self::ProcessingFailed { tenant_id, .. }
            | Self::NotificationSent { tenant_id, .. }
            | Self::ReportDownloaded { tenant_id, .. }
            | Self::ReportSoftDeleted { tenant_id, .. }
            | Self::ReportPurged { tenant_id, .. } => Some(tenant_id),
        }
    }

    /// The user behind the action; system-driven transitions have none.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::ReportUploaded { uploaded_by, .. } => Some(uploaded_by),
            Self::ReportReprocessRequested { requested_by, .. } => Some(requested_by),
            Self::ReportDownloaded { user_id, .. } => Some(user_id),
            Self::ReportSoftDeleted { deleted_by, .. } => Some(deleted_by),
            _ => None,
        }
    }

    /// Short human-readable note stored alongside the action.
    pub fn note(&self) -> String {
        match self {
            Self::ServiceStarted { version, .. } => format!("version {}", version),
            Self::ServiceStopped { reason } => reason.clone(),
            Self::ReportUploaded {
                filename,
                size_bytes,
                ..
            } => format!("{} ({} bytes)", filename, size_bytes),
            Self::ReportReprocessRequested {
                previous_status, ..
            } => format!("reprocess requested from {}", previous_status),
            Self::ProcessingStarted {
                worker_id, attempt, ..
            } => format!("attempt {} on {}", attempt, worker_id),
            Self::ProcessingCompleted {
                engine,
                score,
                finding_count,
                ..
            } => format!(
                "engine={} score={} findings={}",
                engine, score, finding_count
            ),
            Self::ProcessingFailed { error, attempt, .. } => {
                format!("attempt {}: {}", attempt, error)
            }
            Self::NotificationSent {
                outcome,
                delivered,
                error,
                ..
            } => match (delivered, error) {
                (true, _) => format!("{} notification delivered", outcome),
                (false, Some(e)) => format!("{} notification failed: {}", outcome, e),
                (false, None) => format!("{} notification failed", outcome),
            },
            Self::ReportDownloaded { .. } => "signed url issued".to_string(),
            Self::ReportSoftDeleted { .. } => "soft deleted".to_string(),
            Self::ReportPurged {
                objects_removed, ..
            } => {
                if objects_removed.is_empty() {
                    "purged; no objects present".to_string()
                } else {
                    format!("purged; removed {}", objects_removed.join(", "))
                }
            }
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub action: String,
    pub report_id: Option<String>,
    pub tenant_id: Option<String>,
    pub actor: Option<String>,
    pub note: String,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Build an unsaved record from an event.
    pub fn from_event(event: AuditEvent) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            action: event.action().as_str().to_string(),
            report_id: event.report_id().map(str::to_string),
            tenant_id: event.tenant_id().map(str::to_string),
            actor: event.actor().map(str::to_string),
            note: event.note(),
            data: event,
        }
    }
}
