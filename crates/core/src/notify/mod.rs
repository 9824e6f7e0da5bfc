//! Report outcome notifications.
//!
//! Delivery is best-effort: the pipeline audits the result of `notify` but
//! never changes a report's outcome because of it.

mod logger;
mod webhook;

pub use logger::LogNotifier;
pub use webhook::WebhookNotifier;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::NotifierConfig;
use crate::report::Report;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Webhook rejected notification with status {0}")]
    Rejected(u16),
}

/// What happened to the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOutcome {
    Completed,
    Failed,
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Completed => "completed",
            NotifyOutcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NotifyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body sent to notification receivers.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: String,
    pub report_id: String,
    pub tenant_id: String,
    pub filename: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Uploader first, then configured admin recipients.
    pub recipients: Vec<String>,
}

impl Notification {
    pub fn new(report: &Report, outcome: NotifyOutcome, admin_recipients: &[String]) -> Self {
        let mut recipients = vec![report.uploaded_by.clone()];
        for admin in admin_recipients {
            if !recipients.contains(admin) {
                recipients.push(admin.clone());
            }
        }
        Self {
            event: format!("report.{}", outcome),
            report_id: report.id.clone(),
            tenant_id: report.tenant_id.clone(),
            filename: report.filename.clone(),
            status: report.status.to_string(),
            score: report.score,
            summary: report.summary.clone(),
            error_message: report.error_message.clone(),
            recipients,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, report: &Report, outcome: NotifyOutcome) -> Result<(), NotifyError>;
}

/// Webhook notifier when a URL is configured, otherwise log-only.
pub fn create_notifier(config: &NotifierConfig) -> Arc<dyn Notifier> {
    match config.webhook_url {
        Some(ref url) => Arc::new(
            WebhookNotifier::new(url.clone(), Duration::from_secs(config.timeout_secs))
                .with_admin_recipients(config.admin_recipients.clone()),
        ),
        None => Arc::new(LogNotifier::new(config.admin_recipients.clone())),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::report::{Report, ReportStatus};

    pub fn report(status: ReportStatus) -> Report {
        Report {
            id: "r-1".to_string(),
            tenant_id: "acme".to_string(),
            uploaded_by: "alice".to_string(),
            filename: "site.txt".to_string(),
            status,
            score: (status == ReportStatus::Done).then_some(85),
            finding_count: 0,
            summary: None,
            source_key: "sources/acme/r-1/site.txt".to_string(),
            output_key: None,
            checksum: None,
            byte_size: None,
            error_message: (status == ReportStatus::Failed).then(|| "boom".to_string()),
            deleted_at: None,
            lease_owner: None,
            lease_expires_at: None,
            uploaded_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::report;
    use super::*;
    use crate::report::ReportStatus;

    #[test]
    fn test_notification_payload() {
        let admins = vec!["ops@example.com".to_string(), "alice".to_string()];
        let n = Notification::new(&report(ReportStatus::Done), NotifyOutcome::Completed, &admins);
        assert_eq!(n.event, "report.completed");
        assert_eq!(n.status, "DONE");
        assert_eq!(n.score, Some(85));
        assert_eq!(n.recipients, vec!["alice", "ops@example.com"]);

        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("error_message").is_none());
    }

    #[test]
    fn test_failed_notification_carries_error() {
        let n = Notification::new(&report(ReportStatus::Failed), NotifyOutcome::Failed, &[]);
        assert_eq!(n.event, "report.failed");
        assert_eq!(n.error_message.as_deref(), Some("boom"));
        assert_eq!(n.score, None);
    }

    #[test]
    fn test_create_notifier_picks_backend() {
        let config = NotifierConfig::default();
        assert_eq!(create_notifier(&config).name(), "log");

        let config = NotifierConfig {
            webhook_url: Some("http://localhost:9/hook".to_string()),
            ..Default::default()
        };
        assert_eq!(create_notifier(&config).name(), "webhook");
    }
}
