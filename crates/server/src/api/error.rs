//! Error responses shared by the API handlers.

use axum::{http::StatusCode, Json};
use inspectra_core::{
    orchestrator::sanitize_error, report::ReportError, report::ReportStatus, DownloadError,
    IngestError,
};
use serde::Serialize;
use tracing::error;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Current report status, for conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(ErrorResponse {
            error: message.into(),
            status: None,
        }),
    )
}

fn conflict(message: String, status: ReportStatus) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: message,
            status: Some(status),
        }),
    )
}

/// Log the cause and return a sanitized 500.
pub fn internal(context: &str, e: impl std::fmt::Display) -> ApiError {
    let message = sanitize_error(&e.to_string());
    error!("{}: {}", context, message);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("{}: {}", context, message),
    )
}

pub fn not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("Report not found: {}", id))
}

pub fn report_error(e: ReportError) -> ApiError {
    match e {
        ReportError::NotFound(id) => not_found(&id),
        ReportError::NotReady { id, status } => conflict(
            format!("Report {} is not ready: status is {}", id, status),
            status,
        ),
        ReportError::InvalidState {
            id,
            status,
            operation,
        } => conflict(
            format!("Cannot {} report {}: status is {}", operation, id, status),
            status,
        ),
        ReportError::Conflict { id, reason } => api_error(
            StatusCode::CONFLICT,
            format!("Report {} conflict: {}", id, reason),
        ),
        other => internal("Report store error", other),
    }
}

pub fn download_error(e: DownloadError) -> ApiError {
    match e {
        DownloadError::NotFound(id) => not_found(&id),
        DownloadError::NotReady { id, status } => conflict(
            format!("Report {} is not ready: status is {}", id, status),
            status,
        ),
        other => internal("Download failed", other),
    }
}

pub fn ingest_error(e: IngestError) -> ApiError {
    match e {
        IngestError::TooLarge { .. } => api_error(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
        IngestError::UnsupportedType(_) => {
            api_error(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
        }
        ref rejected if rejected.is_rejection() => {
            api_error(StatusCode::BAD_REQUEST, rejected.to_string())
        }
        IngestError::Report(report) => report_error(report),
        other => internal("Upload failed", other),
    }
}
