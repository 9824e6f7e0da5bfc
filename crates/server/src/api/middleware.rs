//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use inspectra_core::{report::Requester, AuthRequest, Identity};
use tracing::{debug, warn};

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware that validates requests using the configured authenticator.
///
/// On success the resolved `Identity` (user, tenant and scope) is stored in
/// the request extensions for the `Caller` extractor. Missing or wrong
/// credentials yield 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authenticator = state.authenticator();

    // Extract headers into HashMap for AuthRequest
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    // Get source IP (default to localhost if not available)
    let source_ip = request
        .extensions()
        .get::<std::net::SocketAddr>()
        .map(|addr| addr.ip())
        .unwrap_or(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

    let auth_request = AuthRequest { headers, source_ip };

    match authenticator.authenticate(&auth_request).await {
        Ok(identity) => {
            debug!(user_id = %identity.user_id, tenant_id = %identity.tenant_id, "Authenticated");
            let mut request = request;
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            AUTH_FAILURES_TOTAL.with_label_values(&[e.kind()]).inc();
            if e.is_client_error() {
                debug!("Authentication failed: {}", e);
                Err(StatusCode::UNAUTHORIZED)
            } else {
                // Service unavailable or misconfigured
                warn!("Authentication error: {}", e);
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Extractor for the authenticated caller.
///
/// Rejects with 401 when no identity is present, which only happens on a
/// route mounted outside `auth_middleware`.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl Caller {
    pub fn requester(&self) -> Requester {
        self.0.requester()
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let caller = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Caller)
            .ok_or(StatusCode::UNAUTHORIZED);
        std::future::ready(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request},
        middleware,
        routing::get,
        Router,
    };
    use http_body_util::BodyExt;
    use inspectra_core::{
        audit::{AuditHandle, SqliteAuditStore},
        config::{ApiKeyEntry, AuthConfig},
        create_authenticator, load_config_from_str,
        queue::SqliteJobQueue,
        report::SqliteReportStore,
        storage::UrlSigner,
        testing::MockObjectStore,
        LifecycleManager,
    };
    use tower::ServiceExt;

    fn create_test_state(auth: AuthConfig) -> Arc<AppState> {
        let mut config = load_config_from_str(
            r#"
[auth]
method = "none"

[storage]
signing_secret = "0123456789abcdef0123456789abcdef"
"#,
        )
        .unwrap();
        config.auth = auth;

        let authenticator = Arc::from(create_authenticator(&config.auth).unwrap());
        let reports = Arc::new(SqliteReportStore::in_memory().unwrap());
        let objects = Arc::new(MockObjectStore::new());
        let audit = AuditHandle::new(Arc::new(SqliteAuditStore::in_memory().unwrap()));
        let lifecycle = Arc::new(LifecycleManager::new(
            reports.clone(),
            objects.clone(),
            audit.clone(),
            &config.lifecycle,
        ));

        Arc::new(AppState::new(
            config,
            authenticator,
            audit,
            reports,
            objects,
            UrlSigner::new("0123456789abcdef0123456789abcdef", "http://localhost"),
            Arc::new(SqliteJobQueue::in_memory().unwrap()),
            lifecycle,
            None,
        ))
    }

    fn api_key_auth() -> AuthConfig {
        AuthConfig {
            method: inspectra_core::AuthMethod::ApiKey,
            api_keys: vec![ApiKeyEntry {
                key: "secret-key".to_string(),
                user_id: "alice".to_string(),
                tenant_id: "acme".to_string(),
                elevated: false,
            }],
            default_tenant: "default".to_string(),
        }
    }

    fn none_auth() -> AuthConfig {
        AuthConfig {
            method: inspectra_core::AuthMethod::None,
            api_keys: vec![],
            default_tenant: "default".to_string(),
        }
    }

    async fn whoami(Caller(identity): Caller) -> String {
        format!("{}@{}", identity.user_id, identity.tenant_id)
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/test", get(whoami))
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    async fn body_string(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_none_auth_uses_default_tenant() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app(create_test_state(none_auth()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "anonymous@default");
    }

    #[tokio::test]
    async fn test_api_key_auth_valid() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer secret-key")
            .body(Body::empty())
            .unwrap();

        let response = app(create_test_state(api_key_auth()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "alice@acme");
    }

    #[tokio::test]
    async fn test_api_key_auth_invalid() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer wrong-key")
            .body(Body::empty())
            .unwrap();

        let response = app(create_test_state(api_key_auth()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_key_auth_missing() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app(create_test_state(api_key_auth()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_x_api_key_header() {
        let request = Request::builder()
            .uri("/test")
            .header("X-API-Key", "secret-key")
            .body(Body::empty())
            .unwrap();

        let response = app(create_test_state(api_key_auth()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_caller_without_middleware_is_rejected() {
        let router: Router = Router::new().route("/test", get(whoami));
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
