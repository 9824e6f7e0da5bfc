//! Signed object downloads.
//!
//! Mounted outside the authentication layer: the signature in the URL is
//! the credential.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use inspectra_core::{extract::file_extension, storage::SignatureError};

use super::error::{api_error, internal, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: i64,
    pub signature: String,
}

/// Serve the bytes of `key` for a valid, unexpired signature
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<SignedParams>,
) -> Result<Response, ApiError> {
    if let Err(e) = state
        .signer()
        .verify(&key, params.expires, &params.signature, Utc::now().timestamp())
    {
        debug!(key = %key, "Rejected signed download: {}", e);
        let code = match e {
            SignatureError::Expired => StatusCode::GONE,
            SignatureError::Invalid => StatusCode::FORBIDDEN,
        };
        return Err(api_error(code, e.to_string()));
    }

    let bytes = match state.objects().get(&key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!(key = %key, "Signed download for missing object");
            return Err(api_error(StatusCode::NOT_FOUND, "Object not found"));
        }
        Err(e) => return Err(internal("Failed to read object", e)),
    };

    let filename = key.rsplit('/').next().unwrap_or("download");
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&key).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}

fn content_type(key: &str) -> &'static str {
    match file_extension(key).as_deref() {
        Some("pdf") => "application/pdf",
        Some("md") => "text/markdown; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
