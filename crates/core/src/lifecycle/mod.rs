//! Soft deletion and the purge sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditAction, AuditEvent, AuditFilter, AuditHandle};
use crate::config::LifecycleConfig;
use crate::metrics;
use crate::report::{Report, ReportError, ReportStore, Requester};
use crate::storage::{DeleteOutcome, ObjectStore};

/// Result of one purge sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub candidates: usize,
    pub purged: usize,
    pub failed: usize,
    pub objects_removed: usize,
}

/// Owns the `deleted_at` transition and the removal of expired reports.
pub struct LifecycleManager {
    reports: Arc<dyn ReportStore>,
    objects: Arc<dyn ObjectStore>,
    audit: AuditHandle,
    grace: Duration,
    batch_size: usize,
}

impl LifecycleManager {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        objects: Arc<dyn ObjectStore>,
        audit: AuditHandle,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            reports,
            objects,
            audit,
            grace: Duration::days(config.grace_period_days as i64),
            batch_size: config.purge_batch_size.max(1),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Soft-delete a report in the requester's scope. `NotFound` when it is
    /// absent or out of scope, `Conflict` when already deleted.
    pub fn soft_delete(
        &self,
        report_id: &str,
        requester: &Requester,
    ) -> Result<DateTime<Utc>, ReportError> {
        let report = self
            .reports
            .soft_delete(report_id, &requester.scope(), Utc::now())?;
        let deleted_at = report
            .deleted_at
            .ok_or_else(|| ReportError::Database(format!("deleted_at not set on {}", report_id)))?;

        info!(
            report_id,
            tenant_id = %report.tenant_id,
            user_id = %requester.user_id,
            "Report soft-deleted"
        );
        self.audit.emit(AuditEvent::ReportSoftDeleted {
            report_id: report.id,
            tenant_id: report.tenant_id,
            deleted_by: requester.user_id.clone(),
        });

        Ok(deleted_at)
    }

    /// Purge every report soft-deleted before `now - grace`, paging through
    /// candidates `batch_size` at a time. Each candidate is handled
    /// independently; a failed one is left for the next sweep.
    pub async fn purge_sweep(&self, now: DateTime<Utc>) -> PurgeSummary {
        let cutoff = now - self.grace;
        let mut summary = PurgeSummary::default();
        // Rows that stay behind in this sweep; they would come back on every page.
        let mut skipped: HashSet<String> = HashSet::new();

        loop {
            let limit = self.batch_size + skipped.len();
            let page = match self.reports.purge_candidates(cutoff, limit) {
                Ok(page) => page,
                Err(e) => {
                    error!("Failed to list purge candidates: {}", e);
                    break;
                }
            };
            let exhausted = page.len() < limit;
            let fresh: Vec<Report> = page
                .into_iter()
                .filter(|report| !skipped.contains(&report.id))
                .collect();
            if fresh.is_empty() {
                break;
            }
            summary.candidates += fresh.len();

            for report in &fresh {
                match self.purge_one(report).await {
                    Ok(Some(removed)) => {
                        summary.purged += 1;
                        summary.objects_removed += removed;
                        metrics::PURGE_RESULTS.with_label_values(&["purged"]).inc();
                        metrics::OBJECTS_PURGED.inc_by(removed as u64);
                    }
                    Ok(None) => {
                        skipped.insert(report.id.clone());
                    }
                    Err(e) => {
                        summary.failed += 1;
                        skipped.insert(report.id.clone());
                        metrics::PURGE_RESULTS.with_label_values(&["failed"]).inc();
                        warn!(report_id = %report.id, "Purge failed, will retry next sweep: {}", e);
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        if summary.candidates > 0 {
            info!(
                candidates = summary.candidates,
                purged = summary.purged,
                failed = summary.failed,
                objects_removed = summary.objects_removed,
                "Purge sweep finished"
            );
        }
        summary
    }

    /// Remove one report's objects, audit, then delete the row. Returns the
    /// number of objects removed, or None if the row changed underneath us.
    async fn purge_one(&self, report: &Report) -> Result<Option<usize>, String> {
        let mut keys = vec![report.source_key.clone()];
        if let Some(ref output) = report.output_key {
            keys.push(output.clone());
        }

        let mut removed = Vec::new();
        for key in keys {
            match self.objects.delete(&key).await {
                Ok(DeleteOutcome::Deleted) => removed.push(key),
                Ok(DeleteOutcome::Absent) => debug!(key = %key, "Object already gone"),
                Err(e) => return Err(format!("deleting {}: {}", key, e)),
            }
        }

        let count = removed.len();
        // A previous sweep may have audited this purge and then failed on the row.
        let already_audited = self
            .audit
            .count(
                &AuditFilter::new()
                    .with_report_id(&report.id)
                    .with_action(AuditAction::ReportPurge.as_str()),
            )
            .map_err(|e| format!("audit: {}", e))?
            > 0;
        if !already_audited {
            self.audit
                .record(AuditEvent::ReportPurged {
                    report_id: report.id.clone(),
                    tenant_id: report.tenant_id.clone(),
                    objects_removed: removed,
                })
                .map_err(|e| format!("audit: {}", e))?;
        }

        match self.reports.delete_purged(&report.id) {
            Ok(true) => Ok(Some(count)),
            Ok(false) => {
                debug!(report_id = %report.id, "Report no longer purgeable");
                Ok(None)
            }
            Err(e) => Err(format!("deleting row: {}", e)),
        }
    }
}
