use async_trait::async_trait;
use tracing::info;

use super::{Notification, Notifier, NotifyError, NotifyOutcome};
use crate::report::Report;

/// Notifier that only writes the notification to the log.
pub struct LogNotifier {
    admin_recipients: Vec<String>,
}

impl LogNotifier {
    pub fn new(admin_recipients: Vec<String>) -> Self {
        Self { admin_recipients }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, report: &Report, outcome: NotifyOutcome) -> Result<(), NotifyError> {
        let notification = Notification::new(report, outcome, &self.admin_recipients);
        info!(
            report_id = %notification.report_id,
            tenant_id = %notification.tenant_id,
            recipients = ?notification.recipients,
            "Notification: {} ({})",
            notification.event,
            notification.status
        );
        Ok(())
    }
}
