use std::sync::Arc;

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore};

/// Handle for emitting audit events
///
/// Cheaply cloneable and shared by the pipeline, the lifecycle manager and
/// the HTTP handlers. Writes go straight to the store so the ledger entry
/// exists once the transition it describes has been reported.
#[derive(Clone)]
pub struct AuditHandle {
    store: Arc<dyn AuditStore>,
}

impl AuditHandle {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Record an event, returning the stored entry's ID.
    pub fn record(&self, event: AuditEvent) -> Result<i64, AuditError> {
        let record = AuditRecord::from_event(event);
        self.store.insert(&record)
    }

    /// Record an event; failures are logged and never propagated.
    pub fn emit(&self, event: AuditEvent) {
        let action = event.action();
        if let Err(e) = self.record(event) {
            tracing::error!("Failed to write audit entry {}: {}", action, e);
        }
    }

    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        self.store.query(filter)
    }

    pub fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        self.store.count(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::SqliteAuditStore;

    fn handle() -> AuditHandle {
        AuditHandle::new(Arc::new(SqliteAuditStore::in_memory().unwrap()))
    }

    #[test]
    fn test_emit_persists_event() {
        let handle = handle();

        handle.emit(AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        });

        let records = handle.query(&AuditFilter::new()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "SERVICE_STARTED");
        assert!(matches!(records[0].data, AuditEvent::ServiceStarted { .. }));
    }

    #[test]
    fn test_clones_share_store() {
        let handle1 = handle();
        let handle2 = handle1.clone();

        handle1.emit(AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
        });
        handle2.emit(AuditEvent::ServiceStopped {
            reason: "test".to_string(),
        });

        assert_eq!(handle1.count(&AuditFilter::new()).unwrap(), 2);
    }

    #[test]
    fn test_record_returns_id() {
        let handle = handle();
        let id = handle
            .record(AuditEvent::ReportSoftDeleted {
                report_id: "r-1".to_string(),
                tenant_id: "acme".to_string(),
                deleted_by: "alice".to_string(),
            })
            .unwrap();
        assert!(id > 0);
    }
}
