//! Ingestion: accepts uploaded documents and schedules their processing.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::config::{IngestionConfig, WorkerConfig};
use crate::extract::file_extension;
use crate::orchestrator::source_key;
use crate::queue::{JobQueue, QueueError, RetryPolicy, PROCESS_REPORT};
use crate::report::{new_report_id, CreateReportRequest, Report, ReportError, ReportStore, Requester};
use crate::storage::{ObjectStore, StorageError};

const MAX_FILENAME_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file is empty")]
    Empty,

    #[error("file is too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("upload of {0} was not confirmed")]
    UploadNotConfirmed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("failed to schedule processing: {0}")]
    Queue(#[from] QueueError),
}

impl IngestError {
    /// Whether the caller sent something we will never accept.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilename(_) | Self::UnsupportedType(_) | Self::Empty | Self::TooLarge { .. }
        )
    }
}

/// Creates reports from uploads and (re)schedules their jobs.
pub struct IngestionService {
    reports: Arc<dyn ReportStore>,
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn JobQueue>,
    audit: AuditHandle,
    allowed_extensions: Vec<String>,
    max_upload_bytes: u64,
    retry: RetryPolicy,
    job_timeout_secs: u64,
}

impl IngestionService {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobQueue>,
        audit: AuditHandle,
        ingestion: &IngestionConfig,
        worker: &WorkerConfig,
    ) -> Self {
        Self {
            reports,
            objects,
            queue,
            audit,
            allowed_extensions: ingestion
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_upload_bytes: ingestion.max_upload_bytes,
            retry: RetryPolicy::new(worker.max_attempts),
            job_timeout_secs: worker.job_timeout_secs,
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Validate and store an upload, create its report in PROCESSING and
    /// enqueue the processing job.
    pub async fn submit(
        &self,
        requester: &Requester,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Report, IngestError> {
        let filename = self.validate(filename, bytes)?;

        let id = new_report_id();
        let key = source_key(&requester.tenant_id, &id, &filename);
        let put = self.objects.put(&key, bytes, content_type(&filename)).await?;
        if !put.ok {
            return Err(IngestError::UploadNotConfirmed(key));
        }

        let report = match self.reports.create(CreateReportRequest {
            id: id.clone(),
            tenant_id: requester.tenant_id.clone(),
            uploaded_by: requester.user_id.clone(),
            filename: filename.clone(),
            source_key: key.clone(),
        }) {
            Ok(report) => report,
            Err(e) => {
                if let Err(cleanup) = self.objects.delete(&key).await {
                    warn!(key = %key, "Failed to remove orphaned upload: {}", cleanup);
                }
                return Err(e.into());
            }
        };

        self.audit.emit(AuditEvent::ReportUploaded {
            report_id: report.id.clone(),
            tenant_id: report.tenant_id.clone(),
            uploaded_by: report.uploaded_by.clone(),
            filename: report.filename.clone(),
            size_bytes: put.size,
        });

        self.schedule(&report.id)?;

        info!(
            report_id = %report.id,
            tenant_id = %report.tenant_id,
            filename = %report.filename,
            size = put.size,
            "Report uploaded"
        );
        Ok(report)
    }

    /// Move a DONE or FAILED report back to PROCESSING and enqueue it again.
    pub fn reprocess(&self, report_id: &str, requester: &Requester) -> Result<Report, IngestError> {
        let scope = requester.scope();
        let previous = self
            .reports
            .find_in_scope(report_id, &scope)?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))?
            .status;
        let report = self
            .reports
            .reset_for_reprocess(report_id, &scope, Utc::now())?;

        self.audit.emit(AuditEvent::ReportReprocessRequested {
            report_id: report.id.clone(),
            tenant_id: report.tenant_id.clone(),
            requested_by: requester.user_id.clone(),
            previous_status: previous.to_string(),
        });

        self.schedule(&report.id)?;

        info!(report_id = %report.id, user_id = %requester.user_id, "Report queued for reprocessing");
        Ok(report)
    }

    /// Enqueue the job; a report that cannot be queued is failed so it
    /// never sits in PROCESSING forever.
    fn schedule(&self, report_id: &str) -> Result<(), IngestError> {
        match self
            .queue
            .enqueue(PROCESS_REPORT, report_id, self.retry, self.job_timeout_secs)
        {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(report_id, "Failed to enqueue report: {}", e);
                if let Err(fail) =
                    self.reports
                        .fail(report_id, None, "could not be scheduled for processing", Utc::now())
                {
                    error!(report_id, "Failed to mark unscheduled report: {}", fail);
                }
                Err(e.into())
            }
        }
    }

    fn validate(&self, filename: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let filename = clean_filename(filename)?;

        let ext = file_extension(&filename)
            .ok_or_else(|| IngestError::UnsupportedType(filename.clone()))?;
        if !self.allowed_extensions.iter().any(|allowed| *allowed == ext) {
            return Err(IngestError::UnsupportedType(ext));
        }

        if bytes.is_empty() {
            return Err(IngestError::Empty);
        }
        let size = bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(IngestError::TooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }
        Ok(filename)
    }
}

/// Strip any client-side directory and reject names unusable as a key segment.
fn clean_filename(raw: &str) -> Result<String, IngestError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(IngestError::InvalidFilename(raw.to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(IngestError::InvalidFilename(raw.to_string()));
    }
    if name.chars().count() > MAX_FILENAME_CHARS {
        return Err(IngestError::InvalidFilename(format!(
            "longer than {} characters",
            MAX_FILENAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn content_type(filename: &str) -> &'static str {
    match file_extension(filename).as_deref() {
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, SqliteAuditStore};
    use crate::queue::{JobStatus, SqliteJobQueue};
    use crate::report::{ReportStatus, SqliteReportStore};
    use crate::testing::MockObjectStore;

    struct Fixture {
        service: IngestionService,
        reports: Arc<SqliteReportStore>,
        objects: MockObjectStore,
        queue: Arc<SqliteJobQueue>,
        audit: AuditHandle,
    }

    fn fixture() -> Fixture {
        let reports = Arc::new(SqliteReportStore::in_memory().unwrap());
        let objects = MockObjectStore::new();
        let queue = Arc::new(SqliteJobQueue::in_memory().unwrap());
        let audit = AuditHandle::new(Arc::new(SqliteAuditStore::in_memory().unwrap()));
        let service = IngestionService::new(
            reports.clone(),
            Arc::new(objects.clone()),
            queue.clone(),
            audit.clone(),
            &IngestionConfig {
                max_upload_bytes: 64,
                ..Default::default()
            },
            &WorkerConfig::default(),
        );
        Fixture {
            service,
            reports,
            objects,
            queue,
            audit,
        }
    }

    fn alice() -> Requester {
        Requester {
            user_id: "alice".to_string(),
            tenant_id: "acme".to_string(),
            elevated: false,
        }
    }

    #[tokio::test]
    async fn test_submit_creates_report_and_job() {
        let f = fixture();
        let report = f
            .service
            .submit(&alice(), "C:\\docs\\site-visit.txt", b"Risk class 2")
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Processing);
        assert_eq!(report.filename, "site-visit.txt");
        assert_eq!(report.tenant_id, "acme");
        assert_eq!(
            report.source_key,
            format!("sources/acme/{}/site-visit.txt", report.id)
        );
        assert!(f.objects.contains(&report.source_key).await);

        let job = f.queue.get(1).unwrap().unwrap();
        assert_eq!(job.report_id, report.id);
        assert_eq!(job.handler, PROCESS_REPORT);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.max_attempts, 3);

        let uploads = f
            .audit
            .count(&AuditFilter::new().with_action("UPLOAD"))
            .unwrap();
        assert_eq!(uploads, 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_uploads() {
        let f = fixture();
        let err = f.service.submit(&alice(), "scan.exe", b"MZ").await.unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType(ref e) if e == "exe"));
        assert!(err.is_rejection());

        let err = f.service.submit(&alice(), "README", b"x").await.unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType(_)));

        let err = f.service.submit(&alice(), "a.txt", b"").await.unwrap_err();
        assert!(matches!(err, IngestError::Empty));

        let err = f
            .service
            .submit(&alice(), "a.txt", &[b'x'; 65])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::TooLarge { size: 65, max: 64 }));

        let err = f.service.submit(&alice(), "docs/..", b"x").await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidFilename(_)));

        assert!(f.objects.keys().await.is_empty());
        assert_eq!(f.queue.stats().unwrap().queued, 0);
    }

    #[tokio::test]
    async fn test_submit_unconfirmed_upload_creates_nothing() {
        let f = fixture();
        f.objects.set_put_unconfirmed(true).await;
        let err = f.service.submit(&alice(), "a.txt", b"text").await.unwrap_err();
        assert!(matches!(err, IngestError::UploadNotConfirmed(_)));
        assert_eq!(
            f.reports
                .count(&crate::report::ReportFilter::new(crate::report::Scope::All))
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_reprocess_requires_terminal_status() {
        let f = fixture();
        let report = f.service.submit(&alice(), "a.txt", b"text").await.unwrap();

        let err = f.service.reprocess(&report.id, &alice()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Report(ReportError::InvalidState { .. })
        ));

        f.reports
            .fail(&report.id, None, "extraction failed", Utc::now())
            .unwrap();
        let reset = f.service.reprocess(&report.id, &alice()).unwrap();
        assert_eq!(reset.status, ReportStatus::Processing);
        assert!(reset.error_message.is_none());
        assert_eq!(f.queue.stats().unwrap().queued, 2);
    }

    #[tokio::test]
    async fn test_reprocess_is_tenant_scoped() {
        let f = fixture();
        let report = f.service.submit(&alice(), "a.txt", b"text").await.unwrap();
        f.reports
            .fail(&report.id, None, "boom", Utc::now())
            .unwrap();

        let mallory = Requester {
            user_id: "mallory".to_string(),
            tenant_id: "globex".to_string(),
            elevated: false,
        };
        assert!(matches!(
            f.service.reprocess(&report.id, &mallory),
            Err(IngestError::Report(ReportError::NotFound(_)))
        ));
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("/tmp/x/report.md").unwrap(), "report.md");
        assert_eq!(clean_filename("  notes.txt ").unwrap(), "notes.txt");
        assert!(clean_filename("dir/").is_err());
        assert!(clean_filename("a\nb.txt").is_err());
    }
}
