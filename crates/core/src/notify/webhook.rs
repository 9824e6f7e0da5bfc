use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Notification, Notifier, NotifyError, NotifyOutcome};
use crate::report::Report;

/// POSTs a JSON [`Notification`] to a fixed URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    admin_recipients: Vec<String>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
            admin_recipients: Vec::new(),
        }
    }

    pub fn with_admin_recipients(mut self, recipients: Vec<String>) -> Self {
        self.admin_recipients = recipients;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, report: &Report, outcome: NotifyOutcome) -> Result<(), NotifyError> {
        let notification = Notification::new(report, outcome, &self.admin_recipients);

        let response = self
            .client
            .post(&self.url)
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!(report_id = %report.id, "Webhook accepted {}", notification.event);
        Ok(())
    }
}
