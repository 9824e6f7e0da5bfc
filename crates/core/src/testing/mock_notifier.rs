//! Mock notifier for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::notify::{Notifier, NotifyError, NotifyOutcome};
use crate::report::{Report, ReportStatus};

/// A recorded notification for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub report_id: String,
    pub outcome: NotifyOutcome,
    /// Report status at the time of the call.
    pub status: ReportStatus,
    pub delivered: bool,
}

/// Mock implementation of the Notifier trait.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<RwLock<Vec<RecordedNotification>>>,
    failing: Arc<RwLock<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    pub async fn recorded(&self) -> Vec<RecordedNotification> {
        self.sent.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn notify(&self, report: &Report, outcome: NotifyOutcome) -> Result<(), NotifyError> {
        let failing = *self.failing.read().await;
        self.sent.write().await.push(RecordedNotification {
            report_id: report.id.clone(),
            outcome,
            status: report.status,
            delivered: !failing,
        });
        if failing {
            return Err(NotifyError::Http("simulated delivery failure".to_string()));
        }
        Ok(())
    }
}
