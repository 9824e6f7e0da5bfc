//! Report lifecycle through the HTTP API: upload, processing, retrieval,
//! signed downloads, deletion and reprocessing.

mod common;

use axum::http::{header, StatusCode};
use inspectra_core::storage::sha256_hex;

use common::{fixtures, signed_path, TestFixture, ADMIN, ALICE, BOB, MAX_UPLOAD_BYTES};

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_creates_processing_report() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .upload(ALICE, "site.txt", fixtures::RISK_CLASS_ONLY.as_bytes())
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert!(response.body["id"].is_string());
    assert_json_path!(response.body, "status", "PROCESSING");

    let id = response.body["id"].as_str().unwrap();
    let report = fixture.reports.get(id).unwrap().unwrap();
    assert_eq!(report.tenant_id, "acme");
    assert_eq!(report.uploaded_by, "alice");
    assert_eq!(report.filename, "site.txt");
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload(ALICE, "setup.exe", b"MZ binary").await;
    assert_status!(response, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_upload_rejects_empty_file() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload(ALICE, "site.txt", b"").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let fixture = TestFixture::new().await;

    let content = vec![b'a'; MAX_UPLOAD_BYTES + 1];
    let response = fixture.upload(ALICE, "site.txt", &content).await;
    assert_status!(response, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_requires_authentication() {
    let fixture = TestFixture::new().await;

    let response = fixture.upload("wrong-key", "site.txt", b"Risk class 2").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Processing and retrieval
// =============================================================================

#[tokio::test]
async fn test_processed_report_detail() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::RISK_CLASS_ONLY)
        .await;

    // Not processed yet: no analysis
    let response = fixture.get(ALICE, &format!("/api/v1/reports/{}", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", "PROCESSING");
    assert!(response.body["analysis"].is_null());

    assert_eq!(fixture.drain().await, 1);

    let response = fixture.get(ALICE, &format!("/api/v1/reports/{}", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", "DONE");
    assert_json_path!(response.body, "score", 58);
    assert_json_path!(response.body, "finding_count", 7);
    assert_eq!(response.body["analysis"]["engine"], "rules");
    assert_eq!(response.body["analysis"]["passed_rules"], 1);
    assert_eq!(response.body["findings"].as_array().unwrap().len(), 7);
    assert_eq!(fixture.notifier.count().await, 1);
}

#[tokio::test]
async fn test_list_is_tenant_scoped() {
    let fixture = TestFixture::new().await;
    fixture
        .upload_ok(ALICE, "a.txt", fixtures::RISK_CLASS_ONLY)
        .await;
    fixture
        .upload_ok(ALICE, "b.txt", fixtures::COMPLETE_REPORT)
        .await;
    fixture
        .upload_ok(BOB, "c.txt", fixtures::COMPLETE_REPORT)
        .await;

    let response = fixture.get(ALICE, "/api/v1/reports").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total", 2);
    for report in response.body["reports"].as_array().unwrap() {
        assert_eq!(report["tenant_id"], "acme");
    }

    let response = fixture.get(BOB, "/api/v1/reports").await;
    assert_json_path!(response.body, "total", 1);

    let response = fixture.get(ADMIN, "/api/v1/reports").await;
    assert_json_path!(response.body, "total", 3);
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let fixture = TestFixture::new().await;
    for name in ["a.txt", "b.txt", "c.txt"] {
        fixture
            .upload_ok(ALICE, name, fixtures::COMPLETE_REPORT)
            .await;
    }

    let response = fixture.get(ALICE, "/api/v1/reports?limit=2").await;
    assert_json_path!(response.body, "total", 3);
    assert_json_path!(response.body, "limit", 2);
    assert_eq!(response.body["reports"].as_array().unwrap().len(), 2);

    let response = fixture.get(ALICE, "/api/v1/reports?status=DONE").await;
    assert_json_path!(response.body, "total", 0);

    fixture.drain().await;
    let response = fixture.get(ALICE, "/api/v1/reports?status=done").await;
    assert_json_path!(response.body, "total", 3);

    let response = fixture.get(ALICE, "/api/v1/reports?status=bogus").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_tenant_gets_not_found() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::COMPLETE_REPORT)
        .await;
    fixture.drain().await;

    let response = fixture.get(BOB, &format!("/api/v1/reports/{}", id)).await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture
        .get(BOB, &format!("/api/v1/reports/{}/download", id))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture.get(ADMIN, &format!("/api/v1/reports/{}", id)).await;
    assert_status!(response, StatusCode::OK);
}

// =============================================================================
// Downloads
// =============================================================================

#[tokio::test]
async fn test_download_before_processing_conflicts() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::COMPLETE_REPORT)
        .await;

    let response = fixture
        .get(ALICE, &format!("/api/v1/reports/{}/download", id))
        .await;
    assert_status!(response, StatusCode::CONFLICT);
    assert_json_path!(response.body, "status", "PROCESSING");
}

#[tokio::test]
async fn test_signed_download_serves_conclusion() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::RISK_CLASS_ONLY)
        .await;
    fixture.drain().await;

    let response = fixture
        .get(ALICE, &format!("/api/v1/reports/{}/download", id))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "filename", "site-conclusion.pdf");
    assert_json_path!(response.body, "expires_in", 300);

    let url = response.body["url"].as_str().unwrap();
    let checksum = response.body["checksum"].as_str().unwrap();
    let size = response.body["file_size"].as_u64().unwrap();

    // The link works without credentials
    let object = fixture.get_raw(&signed_path(url)).await;
    assert_eq!(object.status, StatusCode::OK);
    assert_eq!(object.headers[header::CONTENT_TYPE], "application/pdf");
    assert!(object.bytes.starts_with(b"%PDF"));
    assert_eq!(object.bytes.len() as u64, size);
    assert_eq!(sha256_hex(&object.bytes), checksum);
}

#[tokio::test]
async fn test_tampered_signature_is_forbidden() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::COMPLETE_REPORT)
        .await;
    fixture.drain().await;

    let report = fixture.reports.get(&id).unwrap().unwrap();
    let key = report.output_key.unwrap();
    let expires = chrono::Utc::now().timestamp() + 60;

    let url = fixture.signer.signed_url(&key, expires);
    let tampered = format!("{}00", signed_path(&url));
    let object = fixture.get_raw(&tampered).await;
    assert_eq!(object.status, StatusCode::FORBIDDEN);

    // A valid signature for one key does not open another
    let source = fixture.signer.signed_url(&report.source_key, expires);
    let swapped = signed_path(&source).replace(&report.source_key, &key);
    let object = fixture.get_raw(&swapped).await;
    assert_eq!(object.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_link_is_gone() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::COMPLETE_REPORT)
        .await;
    fixture.drain().await;

    let key = fixture
        .reports
        .get(&id)
        .unwrap()
        .unwrap()
        .output_key
        .unwrap();
    let url = fixture
        .signer
        .signed_url(&key, chrono::Utc::now().timestamp() - 10);

    let object = fixture.get_raw(&signed_path(&url)).await;
    assert_eq!(object.status, StatusCode::GONE);
}

// =============================================================================
// Deletion
// =============================================================================

#[tokio::test]
async fn test_soft_delete_hides_report() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::COMPLETE_REPORT)
        .await;
    fixture.drain().await;

    let response = fixture
        .delete(ALICE, &format!("/api/v1/reports/{}", id))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "id", id.as_str());
    assert!(response.body["deleted_at"].is_string());

    let response = fixture.get(ALICE, &format!("/api/v1/reports/{}", id)).await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture
        .get(ALICE, &format!("/api/v1/reports/{}/download", id))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture.get(ALICE, "/api/v1/reports").await;
    assert_json_path!(response.body, "total", 0);

    let response = fixture
        .delete(ALICE, &format!("/api/v1/reports/{}", id))
        .await;
    assert_status!(response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_other_tenant_not_found() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::COMPLETE_REPORT)
        .await;

    let response = fixture.delete(BOB, &format!("/api/v1/reports/{}", id)).await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let report = fixture.reports.get(&id).unwrap().unwrap();
    assert!(report.deleted_at.is_none());
}

// =============================================================================
// Reprocessing
// =============================================================================

#[tokio::test]
async fn test_reprocess_done_report() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::RISK_CLASS_ONLY)
        .await;

    // Still processing
    let response = fixture
        .post(ALICE, &format!("/api/v1/reports/{}/reprocess", id))
        .await;
    assert_status!(response, StatusCode::CONFLICT);
    assert_json_path!(response.body, "status", "PROCESSING");

    fixture.drain().await;
    let first_key = fixture.reports.get(&id).unwrap().unwrap().output_key;

    let response = fixture
        .post(ALICE, &format!("/api/v1/reports/{}/reprocess", id))
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_json_path!(response.body, "status", "PROCESSING");

    assert_eq!(fixture.drain().await, 1);

    let report = fixture.reports.get(&id).unwrap().unwrap();
    assert_eq!(report.score, Some(58));
    assert!(report.output_key.is_some());
    assert_ne!(report.output_key, first_key);
    assert_eq!(fixture.reports.analyses(&id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_reprocess_other_tenant_not_found() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .upload_ok(ALICE, "site.txt", fixtures::COMPLETE_REPORT)
        .await;
    fixture.drain().await;

    let response = fixture
        .post(BOB, &format!("/api/v1/reports/{}/reprocess", id))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}
