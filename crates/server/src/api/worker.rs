use axum::{extract::State, Json};
use std::sync::Arc;
use inspectra_core::orchestrator::WorkerStatus;

use super::error::{internal, ApiError};
use crate::state::AppState;

/// Worker pool and queue status. Reports queue stats even when this
/// instance runs no workers.
pub async fn worker_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<WorkerStatus>, ApiError> {
    if let Some(pool) = state.worker_pool() {
        return Ok(Json(pool.status()));
    }
    let queue = state
        .queue()
        .stats()
        .map_err(|e| internal("Failed to read queue stats", e))?;
    Ok(Json(WorkerStatus {
        queue,
        ..Default::default()
    }))
}
