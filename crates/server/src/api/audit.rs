use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use inspectra_core::audit::{AuditFilter, AuditRecord};

use super::error::{internal, ApiError};
use super::middleware::Caller;
use crate::state::AppState;

/// Maximum allowed limit for audit queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for audit queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    /// Filter by report ID
    pub report_id: Option<String>,
    /// Filter by action (e.g. PROCESS_DONE)
    pub action: Option<String>,
    /// Filter by acting user
    pub actor: Option<String>,
    /// Filter by tenant (elevated callers only)
    pub tenant_id: Option<String>,
    /// Filter events after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter events before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

/// Response for audit query endpoint
#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    /// List of audit events
    pub events: Vec<AuditRecord>,
    /// Total number of matching events
    pub total: i64,
    /// Limit used for this query
    pub limit: i64,
    /// Offset used for this query
    pub offset: i64,
}

/// Query audit events.
///
/// Tenant-scoped callers only see events of their own tenant; elevated
/// callers see everything, including service events.
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Caller(identity): Caller,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, ApiError> {
    // Validate and cap limit
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let offset = params.offset.unwrap_or(0).max(0);

    // Build base filter (shared between query and count)
    let mut base_filter = AuditFilter::new();

    if identity.elevated {
        if let Some(ref tenant_id) = params.tenant_id {
            base_filter = base_filter.with_tenant_id(tenant_id);
        }
    } else {
        base_filter = base_filter.with_tenant_id(&identity.tenant_id);
    }

    if let Some(ref report_id) = params.report_id {
        base_filter = base_filter.with_report_id(report_id);
    }

    if let Some(ref action) = params.action {
        base_filter = base_filter.with_action(action.to_ascii_uppercase());
    }

    if let Some(ref actor) = params.actor {
        base_filter = base_filter.with_actor(actor);
    }

    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    // Create query filter with pagination
    let query_filter = AuditFilter {
        limit,
        offset,
        ..base_filter.clone()
    };

    let events = state
        .audit()
        .query(&query_filter)
        .map_err(|e| internal("Failed to query audit events", e))?;

    // Get total count (without limit/offset) using the base filter
    let total = state
        .audit()
        .count(&base_filter)
        .map_err(|e| internal("Failed to count audit events", e))?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}
