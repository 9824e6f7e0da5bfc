//! Report API handlers: upload, retrieval, download, deletion and reprocessing.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use inspectra_core::{
    report::{Analysis, Finding, Report, ReportFilter, ReportStatus},
    DownloadGrant,
};

use super::error::{
    api_error, download_error, ingest_error, not_found, report_error, ApiError,
};
use super::middleware::Caller;
use crate::metrics::UPLOADS_TOTAL;
use crate::state::AppState;

/// Maximum allowed limit for report queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for report queries
const DEFAULT_LIMIT: i64 = 100;

/// Multipart field carrying the document.
const FILE_FIELD: &str = "file";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing reports
#[derive(Debug, Deserialize)]
pub struct ListReportsParams {
    /// Filter by status (PROCESSING, DONE, FAILED)
    pub status: Option<String>,
    /// Filter by uploader
    pub uploaded_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for report operations
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub id: String,
    pub tenant_id: String,
    pub uploaded_by: String,
    pub filename: String,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    pub finding_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub uploaded_at: String,
    pub updated_at: String,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self {
            id: report.id,
            tenant_id: report.tenant_id,
            uploaded_by: report.uploaded_by,
            filename: report.filename,
            status: report.status,
            score: report.score,
            finding_count: report.finding_count,
            summary: report.summary,
            error_message: report.error_message,
            uploaded_at: report.uploaded_at.to_rfc3339(),
            updated_at: report.updated_at.to_rfc3339(),
        }
    }
}

/// Analysis metadata shown with a report
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub engine: String,
    pub engine_version: String,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_score: Option<u8>,
    pub passed_rules: u32,
    pub failed_rules: u32,
    pub finished_at: String,
    pub duration_ms: i64,
}

impl From<Analysis> for AnalysisResponse {
    fn from(analysis: Analysis) -> Self {
        Self {
            engine: analysis.engine,
            engine_version: analysis.engine_version,
            score: analysis.score,
            model_score: analysis.model_score,
            passed_rules: analysis.passed_rules,
            failed_rules: analysis.failed_rules,
            finished_at: analysis.finished_at.to_rfc3339(),
            duration_ms: analysis.duration_ms,
        }
    }
}

/// Report detail with its latest analysis and findings
#[derive(Debug, Serialize)]
pub struct ReportDetailResponse {
    #[serde(flatten)]
    pub report: ReportResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResponse>,
    pub findings: Vec<Finding>,
}

/// Response for listing reports
#[derive(Debug, Serialize)]
pub struct ListReportsResponse {
    pub reports: Vec<ReportResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for upload and reprocess
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub id: String,
    pub status: ReportStatus,
}

/// Response for soft delete
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: String,
    pub deleted_at: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Upload a document (multipart field `file`) and queue it for processing
pub async fn upload_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
                return Err(api_error(e.status(), e.body_text()));
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => upload = Some((filename, bytes)),
            Err(e) => {
                UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
                return Err(api_error(e.status(), e.body_text()));
            }
        }
        break;
    }

    let Some((filename, bytes)) = upload else {
        UPLOADS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("missing multipart field '{}'", FILE_FIELD),
        ));
    };

    match state
        .ingestion()
        .submit(&caller.requester(), &filename, &bytes)
        .await
    {
        Ok(report) => {
            UPLOADS_TOTAL.with_label_values(&["accepted"]).inc();
            Ok((
                StatusCode::CREATED,
                Json(AcceptedResponse {
                    id: report.id,
                    status: report.status,
                }),
            ))
        }
        Err(e) => {
            let result = if e.is_rejection() { "rejected" } else { "error" };
            UPLOADS_TOTAL.with_label_values(&[result]).inc();
            Err(ingest_error(e))
        }
    }
}

/// List live reports in the caller's scope
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<ListReportsParams>,
) -> Result<Json<ListReportsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = ReportFilter::new(caller.requester().scope());
    if let Some(ref status) = params.status {
        let status: ReportStatus = status
            .parse()
            .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
        filter = filter.with_status(status);
    }
    if let Some(ref uploaded_by) = params.uploaded_by {
        filter = filter.with_uploaded_by(uploaded_by);
    }

    let total = state.reports().count(&filter).map_err(report_error)?;
    let reports = state
        .reports()
        .list(&filter.with_limit(limit).with_offset(offset))
        .map_err(report_error)?;

    Ok(Json(ListReportsResponse {
        reports: reports.into_iter().map(ReportResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Get a report with its latest analysis and findings
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ReportDetailResponse>, ApiError> {
    let report = state
        .reports()
        .find_in_scope(&id, &caller.requester().scope())
        .map_err(report_error)?
        .ok_or_else(|| not_found(&id))?;

    // Findings of a reset report belong to the previous run.
    let (analysis, findings) = if report.status == ReportStatus::Done {
        match state.reports().latest_analysis(&id).map_err(report_error)? {
            Some(analysis) => {
                let findings = state
                    .reports()
                    .findings(&analysis.id)
                    .map_err(report_error)?;
                (Some(AnalysisResponse::from(analysis)), findings)
            }
            None => {
                warn!(report_id = %id, "DONE report without analysis");
                (None, Vec::new())
            }
        }
    } else {
        (None, Vec::new())
    };

    Ok(Json(ReportDetailResponse {
        report: ReportResponse::from(report),
        analysis,
        findings,
    }))
}

/// Authorize a download of the conclusion document
pub async fn download_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<DownloadGrant>, ApiError> {
    state
        .downloads()
        .authorize_download(&id, &caller.requester())
        .await
        .map(Json)
        .map_err(download_error)
}

/// Soft-delete a report
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted_at = state
        .lifecycle()
        .soft_delete(&id, &caller.requester())
        .map_err(report_error)?;
    Ok(Json(DeletedResponse { id, deleted_at }))
}

/// Queue a DONE or FAILED report for another run
pub async fn reprocess_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    match state.ingestion().reprocess(&id, &caller.requester()) {
        Ok(report) => Ok((
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                id: report.id,
                status: report.status,
            }),
        )),
        Err(e) => Err(ingest_error(e)),
    }
}

