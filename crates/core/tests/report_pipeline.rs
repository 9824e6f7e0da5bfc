//! Report pipeline integration tests.
//!
//! These tests drive `ReportPipeline::process` against SQLite stores, the
//! real PDF renderer and mock storage/notification:
//! - Success path, scoring and audit trail
//! - Terminal failures (extraction, missing source)
//! - Transient failures and retry semantics
//! - Redelivery idempotence and reprocessing
//! - AI fallback

use std::sync::Arc;

use chrono::{Duration, Utc};

use inspectra_core::{
    analysis::AnalysisEngine,
    artifact::PdfRenderer,
    audit::{AuditEvent, AuditFilter, AuditHandle, SqliteAuditStore},
    config::ArtifactConfig,
    extract::PlainTextExtractor,
    notify::NotifyOutcome,
    orchestrator::source_key,
    report::{CreateReportRequest, ReportStatus, ReportStore, Scope, Severity, SqliteReportStore},
    storage::{sha256_hex, ObjectStore},
    testing::{fixtures, MockAnalysisEngine, MockNotifier, MockObjectStore},
    Attempt, ProcessOutcome, ReportPipeline,
};

struct TestHarness {
    pipeline: ReportPipeline,
    reports: Arc<SqliteReportStore>,
    objects: MockObjectStore,
    notifier: MockNotifier,
    audit: AuditHandle,
}

impl TestHarness {
    fn new() -> Self {
        Self::build(None)
    }

    fn with_ai(engine: MockAnalysisEngine) -> Self {
        Self::build(Some(Arc::new(engine)))
    }

    fn build(ai: Option<Arc<dyn AnalysisEngine>>) -> Self {
        let reports = Arc::new(SqliteReportStore::in_memory().expect("report store"));
        let objects = MockObjectStore::new();
        let notifier = MockNotifier::new();
        let audit = AuditHandle::new(Arc::new(
            SqliteAuditStore::in_memory().expect("audit store"),
        ));

        let mut pipeline = ReportPipeline::new(
            Arc::clone(&reports) as Arc<dyn ReportStore>,
            Arc::new(objects.clone()),
            Arc::new(PlainTextExtractor::default()),
            Arc::new(PdfRenderer::new(&ArtifactConfig::default())),
            Arc::new(notifier.clone()),
            audit.clone(),
        )
        .with_worker_id("test-worker");
        if let Some(ai) = ai {
            pipeline = pipeline.with_ai(ai);
        }

        Self {
            pipeline,
            reports,
            objects,
            notifier,
            audit,
        }
    }

    async fn upload(&self, id: &str, text: &str) {
        let key = source_key("acme", id, "inspection.txt");
        self.objects.insert(&key, text.as_bytes().to_vec()).await;
        self.reports
            .create(CreateReportRequest {
                id: id.to_string(),
                tenant_id: "acme".to_string(),
                uploaded_by: "alice".to_string(),
                filename: "inspection.txt".to_string(),
                source_key: key,
            })
            .expect("create report");
    }

    fn actions(&self, report_id: &str) -> Vec<String> {
        self.audit
            .query(&AuditFilter::new().with_report_id(report_id))
            .expect("audit query")
            .into_iter()
            .map(|r| r.action)
            .collect()
    }
}

#[tokio::test]
async fn test_keyword_scenario_scores_58() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::RISK_CLASS_ONLY).await;

    let outcome = h.pipeline.process("r-1", Attempt::single()).await;
    assert_eq!(outcome, ProcessOutcome::Done { score: 58 });

    let report = h.reports.get("r-1").unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Done);
    assert_eq!(report.score, Some(58));
    assert_eq!(report.finding_count, 7);
    assert!(report.lease_owner.is_none());
    assert!(report.error_message.is_none());

    let analysis = h.reports.latest_analysis("r-1").unwrap().unwrap();
    assert_eq!(analysis.engine, "rules");
    assert_eq!(analysis.score, 58);
    assert_eq!(analysis.failed_rules, 7);
    assert_eq!(analysis.passed_rules, 1);

    let severities: Vec<_> = h
        .reports
        .findings(&analysis.id)
        .unwrap()
        .into_iter()
        .map(|f| f.severity)
        .collect();
    use Severity::*;
    assert_eq!(
        severities,
        vec![Medium, High, Medium, Medium, Low, Low, Medium]
    );
}

#[tokio::test]
async fn test_done_report_checksum_matches_stored_bytes() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;

    let outcome = h.pipeline.process("r-1", Attempt::single()).await;
    assert_eq!(outcome, ProcessOutcome::Done { score: 100 });

    let report = h.reports.get("r-1").unwrap().unwrap();
    let key = report.output_key.clone().unwrap();
    assert!(key.starts_with("outputs/acme/r-1/"));
    assert!(key.ends_with("/conclusion.pdf"));

    let bytes = h.objects.object(&key).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4"));
    assert_eq!(report.checksum.as_deref(), Some(sha256_hex(&bytes).as_str()));
    assert_eq!(report.byte_size, Some(bytes.len() as u64));

    assert_eq!(
        h.actions("r-1"),
        vec!["PROCESS_START", "PROCESS_DONE", "NOTIFICATION_SENT"]
    );
    let sent = h.notifier.recorded().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].outcome, NotifyOutcome::Completed);
    assert_eq!(sent[0].status, ReportStatus::Done);
}

#[tokio::test]
async fn test_extraction_failure_is_terminal() {
    let h = TestHarness::new();
    h.upload("r-1", "   \n  ").await;

    let outcome = h.pipeline.process("r-1", Attempt::new(1, 3)).await;
    assert!(matches!(outcome, ProcessOutcome::Failed { .. }));

    let report = h.reports.get("r-1").unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    assert!(report.error_message.as_deref().unwrap().contains("extraction failed"));
    assert!(report.output_key.is_none());
    assert!(report.checksum.is_none());
    assert!(report.byte_size.is_none());
    assert!(report.score.is_none());

    let actions = h.actions("r-1");
    assert_eq!(actions.iter().filter(|a| *a == "PROCESS_FAIL").count(), 1);
    assert_eq!(
        actions,
        vec!["PROCESS_START", "PROCESS_FAIL", "NOTIFICATION_SENT"]
    );
    assert_eq!(h.notifier.recorded().await[0].outcome, NotifyOutcome::Failed);
    assert!(h.reports.latest_analysis("r-1").unwrap().is_none());
}

#[tokio::test]
async fn test_missing_source_object_fails() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;
    h.objects
        .delete(&source_key("acme", "r-1", "inspection.txt"))
        .await
        .unwrap();

    let outcome = h.pipeline.process("r-1", Attempt::new(1, 3)).await;
    assert!(matches!(outcome, ProcessOutcome::Failed { ref error } if error.contains("source object missing")));
    assert_eq!(
        h.reports.get("r-1").unwrap().unwrap().status,
        ReportStatus::Failed
    );
}

#[tokio::test]
async fn test_unconfirmed_upload_retries_then_fails() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;
    h.objects.set_put_unconfirmed(true).await;

    let outcome = h.pipeline.process("r-1", Attempt::new(1, 2)).await;
    assert!(outcome.needs_retry());

    let report = h.reports.get("r-1").unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Processing);
    assert!(report.lease_owner.is_none(), "lease must be released for redelivery");
    assert!(!h.actions("r-1").contains(&"PROCESS_FAIL".to_string()));
    assert_eq!(h.notifier.count().await, 0);

    let outcome = h.pipeline.process("r-1", Attempt::new(2, 2)).await;
    assert!(matches!(outcome, ProcessOutcome::Failed { ref error } if error.contains("not confirmed")));

    let report = h.reports.get("r-1").unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    assert!(report.checksum.is_none());
    assert_eq!(
        h.actions("r-1")
            .iter()
            .filter(|a| *a == "PROCESS_FAIL")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_transient_storage_error_recovers_on_redelivery() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;
    h.objects.fail_next_puts(1).await;

    assert!(h.pipeline.process("r-1", Attempt::new(1, 3)).await.needs_retry());
    assert_eq!(
        h.pipeline.process("r-1", Attempt::new(2, 3)).await,
        ProcessOutcome::Done { score: 100 }
    );
}

#[tokio::test]
async fn test_redelivery_is_idempotent() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::RISK_CLASS_ONLY).await;

    assert_eq!(
        h.pipeline.process("r-1", Attempt::new(1, 3)).await,
        ProcessOutcome::Done { score: 58 }
    );
    let first = h.reports.get("r-1").unwrap().unwrap();

    let again = h.pipeline.process("r-1", Attempt::new(2, 3)).await;
    assert!(matches!(again, ProcessOutcome::Skipped { .. }));

    let after = h.reports.get("r-1").unwrap().unwrap();
    assert_eq!(after.checksum, first.checksum);
    assert_eq!(after.output_key, first.output_key);
    assert_eq!(h.reports.analyses("r-1").unwrap().len(), 1);
    assert_eq!(h.notifier.count().await, 1);
}

#[tokio::test]
async fn test_reprocess_replaces_analysis_and_artifact() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::RISK_CLASS_ONLY).await;
    h.pipeline.process("r-1", Attempt::single()).await;
    let first = h.reports.get("r-1").unwrap().unwrap();
    let first_key = first.output_key.clone().unwrap();

    h.reports
        .reset_for_reprocess("r-1", &Scope::Tenant("acme".into()), Utc::now())
        .unwrap();
    assert_eq!(
        h.pipeline.process("r-1", Attempt::single()).await,
        ProcessOutcome::Done { score: 58 }
    );

    let second = h.reports.get("r-1").unwrap().unwrap();
    assert_ne!(second.output_key.as_deref(), Some(first_key.as_str()));
    assert!(!h.objects.contains(&first_key).await);
    assert!(h.objects.contains(second.output_key.as_deref().unwrap()).await);

    let analyses = h.reports.analyses("r-1").unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(h.reports.findings(&analyses[0].id).unwrap().len(), 7);
}

#[tokio::test]
async fn test_claimed_elsewhere_is_skipped() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;
    let now = Utc::now();
    h.reports
        .try_claim("r-1", "other-worker", now, now + Duration::minutes(5))
        .unwrap()
        .unwrap();

    let outcome = h.pipeline.process("r-1", Attempt::single()).await;
    assert!(matches!(outcome, ProcessOutcome::Skipped { .. }));
    assert!(h.actions("r-1").is_empty());
}

#[tokio::test]
async fn test_missing_and_deleted_reports_are_dropped() {
    let h = TestHarness::new();
    assert!(matches!(
        h.pipeline.process("ghost", Attempt::single()).await,
        ProcessOutcome::Dropped { .. }
    ));

    h.upload("r-1", fixtures::COMPLETE_REPORT).await;
    h.reports
        .soft_delete("r-1", &Scope::All, Utc::now())
        .unwrap();
    assert!(matches!(
        h.pipeline.process("r-1", Attempt::single()).await,
        ProcessOutcome::Dropped { .. }
    ));
    assert_eq!(
        h.reports.get("r-1").unwrap().unwrap().status,
        ReportStatus::Processing
    );
}

#[tokio::test]
async fn test_notification_failure_does_not_change_outcome() {
    let h = TestHarness::new();
    h.notifier.set_failing(true).await;
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;

    assert_eq!(
        h.pipeline.process("r-1", Attempt::single()).await,
        ProcessOutcome::Done { score: 100 }
    );

    let sent = h
        .audit
        .query(&AuditFilter::new().with_action("NOTIFICATION_SENT"))
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0].data,
        AuditEvent::NotificationSent { delivered: false, error: Some(_), .. }
    ));
}

#[tokio::test]
async fn test_ai_result_is_used_with_deterministic_score() {
    let engine = MockAnalysisEngine::returning(
        vec![
            fixtures::finding("missing-signature", Severity::Critical),
            fixtures::finding("unclear-scope", Severity::Low),
        ],
        Some(95),
    );
    let h = TestHarness::with_ai(engine.clone());
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;

    assert_eq!(
        h.pipeline.process("r-1", Attempt::single()).await,
        ProcessOutcome::Done { score: 77 }
    );
    assert_eq!(engine.calls(), 1);

    let analysis = h.reports.latest_analysis("r-1").unwrap().unwrap();
    assert_eq!(analysis.engine, "ai:mock");
    assert_eq!(analysis.engine_version, "mock-model");
    assert_eq!(analysis.score, 77);
    assert_eq!(analysis.model_score, Some(95));
}

#[tokio::test]
async fn test_invalid_ai_output_falls_back_to_rules() {
    let h = TestHarness::with_ai(MockAnalysisEngine::invalid_output("missing score"));
    h.upload("r-1", fixtures::RISK_CLASS_ONLY).await;

    assert_eq!(
        h.pipeline.process("r-1", Attempt::single()).await,
        ProcessOutcome::Done { score: 58 }
    );
    let analysis = h.reports.latest_analysis("r-1").unwrap().unwrap();
    assert_eq!(analysis.engine, "rules");
    assert_eq!(analysis.model_score, None);
}

#[tokio::test]
async fn test_unreachable_ai_falls_back_to_rules() {
    let h = TestHarness::with_ai(MockAnalysisEngine::unreachable());
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;

    assert_eq!(
        h.pipeline.process("r-1", Attempt::single()).await,
        ProcessOutcome::Done { score: 100 }
    );
    assert_eq!(
        h.reports.latest_analysis("r-1").unwrap().unwrap().engine,
        "rules"
    );
}

#[tokio::test]
async fn test_fail_abandoned_respects_live_lease() {
    let h = TestHarness::new();
    h.upload("r-1", fixtures::COMPLETE_REPORT).await;
    let now = Utc::now();
    h.reports
        .try_claim("r-1", "crashed", now - Duration::minutes(10), now - Duration::minutes(1))
        .unwrap()
        .unwrap();

    assert!(h.pipeline.fail_abandoned("r-1", "processing timed out").await);
    let report = h.reports.get("r-1").unwrap().unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    assert_eq!(report.error_message.as_deref(), Some("processing timed out"));

    // Already terminal.
    assert!(!h.pipeline.fail_abandoned("r-1", "again").await);
}
