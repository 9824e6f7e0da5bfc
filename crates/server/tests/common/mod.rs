//! Common test utilities for API testing.
//!
//! This module provides a test fixture that creates an in-process server
//! backed by real SQLite stores and a filesystem object store in a temp
//! directory. Workers are not started; tests call `drain()` to process
//! queued jobs deterministically.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use inspectra_core::{
    artifact::PdfRenderer,
    audit::{AuditHandle, SqliteAuditStore},
    create_authenticator,
    extract::PlainTextExtractor,
    load_config_from_str,
    queue::{JobQueue, SqliteJobQueue},
    report::{ReportStore, SqliteReportStore},
    storage::{FsObjectStore, ObjectStore, UrlSigner},
    testing::MockNotifier,
    LifecycleManager, ReportPipeline, WorkerPool,
};
use inspectra_server::{create_router, AppState};

/// Re-export fixtures for test convenience
pub use inspectra_core::testing::fixtures;

pub const ALICE: &str = "alice-key";
pub const BOB: &str = "bob-key";
pub const ADMIN: &str = "admin-key";

pub const SIGNING_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const BASE_URL: &str = "http://localhost:8080";

/// Upload limit configured for the fixture.
pub const MAX_UPLOAD_BYTES: usize = 4096;

const BOUNDARY: &str = "inspectra-test-boundary";

/// Test fixture for API testing.
///
/// Three API keys are configured: alice (tenant acme), bob (tenant globex)
/// and an elevated admin (tenant ops).
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.upload(ALICE, "site.txt", b"Risk class 2").await;
///     assert_eq!(response.status, 201);
///
///     fixture.drain().await;
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Worker pool, never started; see `drain`
    pub pool: Arc<WorkerPool>,
    pub reports: Arc<dyn ReportStore>,
    pub notifier: Arc<MockNotifier>,
    pub signer: UrlSigner,
    /// Temporary directory for the database and object store
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response with the raw body, for non-JSON endpoints
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let objects_root = temp_dir.path().join("objects");

        let config = load_config_from_str(&format!(
            r#"
[auth]
method = "api_key"

[[auth.api_keys]]
key = "{ALICE}"
user_id = "alice"
tenant_id = "acme"

[[auth.api_keys]]
key = "{BOB}"
user_id = "bob"
tenant_id = "globex"

[[auth.api_keys]]
key = "{ADMIN}"
user_id = "admin"
tenant_id = "ops"
elevated = true

[database]
path = {db_path:?}

[storage]
root = {objects_root:?}
public_base_url = "{BASE_URL}"
signing_secret = "{SIGNING_SECRET}"
presign_ttl_secs = 300

[worker]
enabled = false
retry_backoff_secs = 0

[ingestion]
max_upload_bytes = {MAX_UPLOAD_BYTES}
"#
        ))
        .expect("Failed to parse test config");

        let authenticator =
            Arc::from(create_authenticator(&config.auth).expect("Failed to create authenticator"));

        // Create stores
        let audit = AuditHandle::new(Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        ));
        let reports: Arc<dyn ReportStore> = Arc::new(
            SqliteReportStore::new(&db_path).expect("Failed to create report store"),
        );
        let queue: Arc<dyn JobQueue> =
            Arc::new(SqliteJobQueue::new(&db_path).expect("Failed to create job queue"));

        let signer = UrlSigner::new(SIGNING_SECRET, BASE_URL);
        let objects: Arc<dyn ObjectStore> =
            Arc::new(FsObjectStore::new(objects_root, signer.clone()));

        let notifier = Arc::new(MockNotifier::new());
        let pipeline = ReportPipeline::new(
            Arc::clone(&reports),
            Arc::clone(&objects),
            Arc::new(PlainTextExtractor::default()),
            Arc::new(PdfRenderer::new(&config.artifact)),
            notifier.clone(),
            audit.clone(),
        )
        .with_worker_id("api-test");

        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&reports),
            Arc::clone(&objects),
            audit.clone(),
            &config.lifecycle,
        ));
        let pool = Arc::new(WorkerPool::new(
            pipeline,
            Arc::clone(&queue),
            config.worker.clone(),
        ));

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            audit,
            Arc::clone(&reports),
            objects,
            signer.clone(),
            queue,
            lifecycle,
            Some(Arc::clone(&pool)),
        ));

        Self {
            router: create_router(state),
            pool,
            reports,
            notifier,
            signer,
            temp_dir,
        }
    }

    /// Process every queued job. Returns the number handled.
    pub async fn drain(&self) -> usize {
        self.pool.drain().await.expect("Failed to drain queue")
    }

    /// Send an authenticated GET request.
    pub async fn get(&self, key: &str, path: &str) -> TestResponse {
        self.request("GET", path, Some(key), Body::empty(), None).await
    }

    /// Send an authenticated POST request without a body.
    pub async fn post(&self, key: &str, path: &str) -> TestResponse {
        self.request("POST", path, Some(key), Body::empty(), None).await
    }

    /// Send an authenticated DELETE request.
    pub async fn delete(&self, key: &str, path: &str) -> TestResponse {
        self.request("DELETE", path, Some(key), Body::empty(), None).await
    }

    /// Send a GET request without credentials.
    pub async fn get_anonymous(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, Body::empty(), None).await
    }

    /// Upload a document as multipart field `file`.
    pub async fn upload(&self, key: &str, filename: &str, content: &[u8]) -> TestResponse {
        self.request(
            "POST",
            "/api/v1/reports",
            Some(key),
            Body::from(multipart_body("file", filename, content)),
            Some(format!("multipart/form-data; boundary={}", BOUNDARY)),
        )
        .await
    }

    /// Upload a document and return its report id.
    pub async fn upload_ok(&self, key: &str, filename: &str, content: &str) -> String {
        let response = self.upload(key, filename, content.as_bytes()).await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "upload failed: {}",
            response.body
        );
        response.body["id"]
            .as_str()
            .expect("upload response without id")
            .to_string()
    }

    /// Fetch a path without credentials and return the raw body.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            headers,
            bytes,
        }
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        key: Option<&str>,
        body: Body,
        content_type: Option<String>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(key) = key {
            request_builder =
                request_builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        if let Some(content_type) = content_type {
            request_builder = request_builder.header(header::CONTENT_TYPE, content_type);
        }

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Path and query of a signed URL, ready to send to the router.
pub fn signed_path(url: &str) -> String {
    url.strip_prefix(BASE_URL)
        .expect("signed URL on unexpected base")
        .to_string()
}

fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: text/plain\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
