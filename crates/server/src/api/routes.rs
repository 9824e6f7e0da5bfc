use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, map_response_body::MapResponseBodyLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{audit, handlers, objects, reports, worker};
use crate::state::AppState;

/// Room for multipart boundaries and headers on top of the document itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.ingestion().max_upload_bytes() as usize + MULTIPART_OVERHEAD_BYTES;

    // Authenticated API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Reports
        .route(
            "/reports",
            post(reports::upload_report)
                .layer(DefaultBodyLimit::max(upload_limit))
                .get(reports::list_reports),
        )
        .route(
            "/reports/{id}",
            get(reports::get_report).delete(reports::delete_report),
        )
        .route("/reports/{id}/download", get(reports::download_report))
        .route("/reports/{id}/reprocess", post(reports::reprocess_report))
        // Workers
        .route("/worker/status", get(worker::worker_status))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    // Signed links carry their own credential
    let public_routes = Router::new().route("/objects/{*key}", get(objects::get_object));

    Router::new()
        .nest("/api/v1", api_routes.merge(public_routes))
        .route("/metrics", get(handlers::metrics))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics_middleware)),
        )
        .with_state(state)
}
