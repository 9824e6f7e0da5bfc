//! Tenant-scoped download authorization.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::report::{Report, ReportError, ReportStatus, ReportStore, Requester};
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Absent, in another tenant, soft-deleted, or without a stored artifact.
    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Report {id} is not ready: status is {status}")]
    NotReady { id: String, status: ReportStatus },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Report store error: {0}")]
    Store(ReportError),
}

impl From<ReportError> for DownloadError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::NotFound(id) => DownloadError::NotFound(id),
            ReportError::NotReady { id, status } => DownloadError::NotReady { id, status },
            other => DownloadError::Store(other),
        }
    }
}

/// A signed, time-limited link to a conclusion artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadGrant {
    pub url: String,
    /// Seconds until the URL stops working.
    pub expires_in: u64,
    pub filename: String,
    #[serde(rename = "file_size")]
    pub size: u64,
    pub checksum: String,
}

pub struct DownloadAuthorizer {
    reports: Arc<dyn ReportStore>,
    objects: Arc<dyn ObjectStore>,
    audit: AuditHandle,
    ttl: Duration,
}

impl DownloadAuthorizer {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        objects: Arc<dyn ObjectStore>,
        audit: AuditHandle,
        ttl: Duration,
    ) -> Self {
        Self {
            reports,
            objects,
            audit,
            ttl,
        }
    }

    pub async fn authorize_download(
        &self,
        report_id: &str,
        requester: &Requester,
    ) -> Result<DownloadGrant, DownloadError> {
        let result = self.authorize(report_id, requester).await;
        let label = match &result {
            Ok(_) => "granted",
            Err(DownloadError::NotFound(_)) => "not_found",
            Err(DownloadError::NotReady { .. }) => "not_ready",
            Err(_) => "error",
        };
        metrics::DOWNLOADS.with_label_values(&[label]).inc();
        result
    }

    async fn authorize(
        &self,
        report_id: &str,
        requester: &Requester,
    ) -> Result<DownloadGrant, DownloadError> {
        let report = self
            .reports
            .find_in_scope(report_id, &requester.scope())?
            .ok_or_else(|| DownloadError::NotFound(report_id.to_string()))?;

        if report.status != ReportStatus::Done {
            return Err(DownloadError::NotReady {
                id: report.id,
                status: report.status,
            });
        }

        let (Some(output_key), Some(checksum)) = (report.output_key.clone(), report.checksum.clone())
        else {
            warn!(report_id, "DONE report has no stored artifact");
            return Err(DownloadError::NotFound(report_id.to_string()));
        };

        let url = self
            .objects
            .presign(&output_key, self.ttl)
            .await?
            .ok_or_else(|| {
                warn!(report_id, key = %output_key, "Artifact missing from storage");
                DownloadError::NotFound(report_id.to_string())
            })?;

        info!(
            report_id,
            tenant_id = %report.tenant_id,
            user_id = %requester.user_id,
            "Download authorized"
        );
        self.audit.emit(AuditEvent::ReportDownloaded {
            report_id: report.id.clone(),
            tenant_id: report.tenant_id.clone(),
            user_id: requester.user_id.clone(),
        });

        Ok(DownloadGrant {
            url,
            expires_in: self.ttl.as_secs(),
            filename: conclusion_filename(&report),
            size: report.byte_size.unwrap_or(0),
            checksum,
        })
    }
}

/// `site-visit.txt` becomes `site-visit-conclusion.pdf`.
pub fn conclusion_filename(report: &Report) -> String {
    let stem = report
        .filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(&report.filename);
    let extension = report
        .output_key
        .as_deref()
        .and_then(|key| key.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .unwrap_or("pdf");
    format!("{}-conclusion.{}", stem, extension)
}
