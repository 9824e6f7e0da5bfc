//! Report pipeline: one delivered job from PROCESSING to DONE or FAILED.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::analysis::{
    score_findings, summarize, AnalysisEngine, AnalysisError, AnalysisInput, AnalysisResult,
    RuleEngine,
};
use crate::artifact::{ArtifactInput, ArtifactRenderer};
use crate::audit::{AuditEvent, AuditHandle};
use crate::extract::TextExtractor;
use crate::metrics;
use crate::notify::{Notifier, NotifyOutcome};
use crate::report::{Completion, Report, ReportError, ReportStore};
use crate::storage::ObjectStore;

use super::sanitize::sanitize_error;
use super::types::{Attempt, PipelineError, ProcessOutcome};

const DEFAULT_LEASE_SECS: i64 = 360;

/// Object key of a source document.
pub fn source_key(tenant_id: &str, report_id: &str, filename: &str) -> String {
    format!("sources/{}/{}/{}", tenant_id, report_id, filename)
}

/// Object key of a conclusion artifact. Each run writes its own key so a
/// worker that lost its lease never overwrites the bytes of the run that
/// completed.
pub fn output_key(tenant_id: &str, report_id: &str, run_id: &str, extension: &str) -> String {
    format!(
        "outputs/{}/{}/{}/conclusion.{}",
        tenant_id, report_id, run_id, extension
    )
}

/// Drives one report through extraction, analysis, rendering, upload and
/// persistence. Cheap to clone; each worker gets its own copy with its own
/// lease owner id.
#[derive(Clone)]
pub struct ReportPipeline {
    reports: Arc<dyn ReportStore>,
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<dyn TextExtractor>,
    rules: Arc<RuleEngine>,
    ai: Option<Arc<dyn AnalysisEngine>>,
    renderer: Arc<dyn ArtifactRenderer>,
    notifier: Arc<dyn Notifier>,
    audit: AuditHandle,
    worker_id: String,
    lease: Duration,
}

/// What a successful run produced.
struct RunOutput {
    score: u8,
    engine: String,
    finding_count: usize,
    checksum: String,
}

impl ReportPipeline {
    pub fn new(
        reports: Arc<dyn ReportStore>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn TextExtractor>,
        renderer: Arc<dyn ArtifactRenderer>,
        notifier: Arc<dyn Notifier>,
        audit: AuditHandle,
    ) -> Self {
        Self {
            reports,
            objects,
            extractor,
            rules: Arc::new(RuleEngine::new()),
            ai: None,
            renderer,
            notifier,
            audit,
            worker_id: "worker-0".to_string(),
            lease: Duration::seconds(DEFAULT_LEASE_SECS),
        }
    }

    /// Use an AI engine first, falling back to the rule engine on any error.
    pub fn with_ai(mut self, engine: Arc<dyn AnalysisEngine>) -> Self {
        self.ai = Some(engine);
        self
    }

    pub fn with_lease(mut self, lease: std::time::Duration) -> Self {
        self.lease = Duration::from_std(lease).unwrap_or(self.lease);
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// A copy of this pipeline that claims reports as `worker_id`.
    pub fn for_worker(&self, worker_id: impl Into<String>) -> Self {
        self.clone().with_worker_id(worker_id)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    /// Process one delivery of the job for `report_id`.
    pub async fn process(&self, report_id: &str, attempt: Attempt) -> ProcessOutcome {
        let started = Instant::now();
        let outcome = self.run(report_id, attempt).await;

        metrics::JOBS_PROCESSED
            .with_label_values(&[outcome.label()])
            .inc();
        metrics::JOB_DURATION
            .with_label_values(&[outcome.label()])
            .observe(started.elapsed().as_secs_f64());

        outcome
    }

    async fn run(&self, report_id: &str, attempt: Attempt) -> ProcessOutcome {
        let report = match self.reports.get(report_id) {
            Ok(Some(report)) => report,
            Ok(None) => {
                warn!(report_id, "Dropping job for unknown report");
                return ProcessOutcome::Dropped {
                    reason: "report not found".to_string(),
                };
            }
            Err(e) => return self.unclaimed_failure(report_id, attempt, e.into()).await,
        };

        if report.is_deleted() {
            info!(report_id, "Dropping job for deleted report");
            return ProcessOutcome::Dropped {
                reason: "report deleted".to_string(),
            };
        }

        if report.status.is_terminal() {
            debug!(report_id, status = %report.status, "Report already handled");
            return ProcessOutcome::Skipped {
                reason: format!("report already {}", report.status),
            };
        }

        let now = Utc::now();
        let claimed = match self
            .reports
            .try_claim(report_id, &self.worker_id, now, now + self.lease)
        {
            Ok(Some(report)) => report,
            Ok(None) => {
                debug!(report_id, worker = %self.worker_id, "Report claimed elsewhere");
                return ProcessOutcome::Skipped {
                    reason: "report is being processed by another worker".to_string(),
                };
            }
            Err(e) => return self.unclaimed_failure(report_id, attempt, e.into()).await,
        };

        info!(
            report_id,
            tenant_id = %claimed.tenant_id,
            worker = %self.worker_id,
            attempt = attempt.number,
            max_attempts = attempt.max,
            "Processing report"
        );
        self.audit.emit(AuditEvent::ProcessingStarted {
            report_id: claimed.id.clone(),
            tenant_id: claimed.tenant_id.clone(),
            worker_id: self.worker_id.clone(),
            attempt: attempt.number,
        });

        match self.execute(&claimed).await {
            Ok(output) => {
                info!(
                    report_id,
                    score = output.score,
                    engine = %output.engine,
                    findings = output.finding_count,
                    "Report processed"
                );
                self.audit.emit(AuditEvent::ProcessingCompleted {
                    report_id: claimed.id.clone(),
                    tenant_id: claimed.tenant_id.clone(),
                    engine: output.engine,
                    score: output.score,
                    finding_count: output.finding_count,
                    checksum: output.checksum,
                });
                metrics::REPORT_SCORES
                    .with_label_values(&[])
                    .observe(output.score as f64);
                self.notify(&claimed, NotifyOutcome::Completed).await;
                ProcessOutcome::Done {
                    score: output.score,
                }
            }
            Err(PipelineError::Store(ReportError::LeaseLost(_))) => {
                warn!(report_id, worker = %self.worker_id, "Lease lost before completion");
                ProcessOutcome::Skipped {
                    reason: "processing lease lost".to_string(),
                }
            }
            Err(err) => self.claimed_failure(&claimed, attempt, err).await,
        }
    }

    /// Stages 2 to 7. Every error is handled by the caller.
    async fn execute(&self, report: &Report) -> Result<RunOutput, PipelineError> {
        let started_at = Utc::now();

        let stage = Instant::now();
        let source = self
            .objects
            .get(&report.source_key)
            .await?
            .ok_or_else(|| PipelineError::SourceMissing(report.source_key.clone()))?;
        let text = self.extractor.extract(&report.filename, &source).await?;
        observe_stage("extract", stage);

        let stage = Instant::now();
        let input = AnalysisInput {
            tenant_id: report.tenant_id.clone(),
            filename: report.filename.clone(),
            text,
        };
        let result = self.analyze(&input).await?;
        observe_stage("analyze", stage);
        metrics::ENGINE_RUNS
            .with_label_values(&[result.engine.as_str()])
            .inc();

        let score = score_findings(&result.findings);
        let summary = match result.summary {
            Some(ref narrative) => format!("{}. {}", summarize(&result.findings, score), narrative),
            None => summarize(&result.findings, score),
        };

        let stage = Instant::now();
        let bytes = self.renderer.render(&ArtifactInput {
            report_id: &report.id,
            tenant_id: &report.tenant_id,
            filename: &report.filename,
            uploaded_by: &report.uploaded_by,
            uploaded_at: report.uploaded_at,
            engine: &result.engine,
            engine_version: &result.engine_version,
            score,
            summary: &summary,
            findings: &result.findings,
        })?;
        observe_stage("render", stage);

        let stage = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let key = output_key(
            &report.tenant_id,
            &report.id,
            &run_id,
            self.renderer.extension(),
        );
        let put = self
            .objects
            .put(&key, &bytes, self.renderer.content_type())
            .await?;
        if !put.ok {
            return Err(PipelineError::UploadNotConfirmed(key));
        }
        observe_stage("upload", stage);

        let completion = Completion {
            engine: result.engine.clone(),
            engine_version: result.engine_version.clone(),
            score,
            model_score: result.model_score,
            passed_rules: result.passed_rules,
            failed_rules: result.failed_rules,
            summary,
            findings: result.findings,
            output_key: key.clone(),
            checksum: put.checksum.clone(),
            byte_size: put.size,
            started_at,
            finished_at: Utc::now(),
        };

        let stage = Instant::now();
        if let Err(e) = self
            .reports
            .complete(&report.id, &self.worker_id, &completion, Utc::now())
        {
            self.discard_object(&key).await;
            return Err(e.into());
        }
        observe_stage("persist", stage);

        // A reprocessed report leaves the previous run's artifact behind.
        if let Some(ref previous) = report.output_key {
            if *previous != key {
                self.discard_object(previous).await;
            }
        }

        Ok(RunOutput {
            score,
            engine: completion.engine,
            finding_count: completion.findings.len(),
            checksum: put.checksum,
        })
    }

    /// AI first when configured; any AI error falls back to the rules.
    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, AnalysisError> {
        if let Some(ref ai) = self.ai {
            match ai.analyze(input).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let reason = match e {
                        AnalysisError::Validation(_) => "validation",
                        AnalysisError::Llm(_) => "llm",
                    };
                    warn!(
                        tenant_id = %input.tenant_id,
                        filename = %input.filename,
                        "AI analysis failed, falling back to rules: {}",
                        sanitize_error(&e.to_string())
                    );
                    metrics::AI_FALLBACKS.with_label_values(&[reason]).inc();
                }
            }
        }
        self.rules.analyze(input).await
    }

    /// Failure before a lease was taken: only store errors get here.
    async fn unclaimed_failure(
        &self,
        report_id: &str,
        attempt: Attempt,
        err: PipelineError,
    ) -> ProcessOutcome {
        let message = sanitize_error(&err.to_string());
        if !attempt.is_final() {
            warn!(report_id, "Transient failure before claim, will retry: {}", message);
            return ProcessOutcome::Retry { error: message };
        }
        error!(report_id, "Giving up on report: {}", message);
        self.fail_abandoned(report_id, &message).await;
        ProcessOutcome::Failed { error: message }
    }

    async fn claimed_failure(
        &self,
        report: &Report,
        attempt: Attempt,
        err: PipelineError,
    ) -> ProcessOutcome {
        let message = sanitize_error(&err.to_string());

        if err.is_transient() && !attempt.is_final() {
            warn!(
                report_id = %report.id,
                attempt = attempt.number,
                max_attempts = attempt.max,
                "Transient failure, releasing report for retry: {}",
                message
            );
            if let Err(e) = self.reports.release_claim(&report.id, &self.worker_id) {
                // The lease expires on its own.
                warn!(report_id = %report.id, "Failed to release claim: {}", e);
            }
            return ProcessOutcome::Retry { error: message };
        }

        error!(report_id = %report.id, attempt = attempt.number, "Report failed: {}", message);
        self.persist_failure(report, Some(&self.worker_id), attempt, message)
            .await
    }

    /// Write FAILED, audit it and notify. Conditional on `owner` holding the
    /// lease, or on no live lease when `owner` is None.
    async fn persist_failure(
        &self,
        report: &Report,
        owner: Option<&str>,
        attempt: Attempt,
        message: String,
    ) -> ProcessOutcome {
        match self.reports.fail(&report.id, owner, &message, Utc::now()) {
            Ok(true) => {}
            Ok(false) => {
                warn!(report_id = %report.id, "Report no longer held, failure not recorded");
                return ProcessOutcome::Skipped {
                    reason: "processing lease lost".to_string(),
                };
            }
            Err(e) => {
                error!(report_id = %report.id, "Failed to persist FAILED status: {}", e);
                if let Some(owner) = owner {
                    let _ = self.reports.release_claim(&report.id, owner);
                }
                return if attempt.is_final() {
                    ProcessOutcome::Failed { error: message }
                } else {
                    ProcessOutcome::Retry {
                        error: sanitize_error(&e.to_string()),
                    }
                };
            }
        }

        self.audit.emit(AuditEvent::ProcessingFailed {
            report_id: report.id.clone(),
            tenant_id: report.tenant_id.clone(),
            error: message.clone(),
            attempt: attempt.number,
        });
        self.notify(report, NotifyOutcome::Failed).await;

        ProcessOutcome::Failed { error: message }
    }

    /// Handle a delivery that ran past its timeout. The pipeline future has
    /// been dropped; this worker may still hold the lease.
    pub async fn abandon(&self, report_id: &str, attempt: Attempt, reason: &str) -> ProcessOutcome {
        metrics::JOB_TIMEOUTS.inc();
        let message = sanitize_error(reason);

        if !attempt.is_final() {
            if let Err(e) = self.reports.release_claim(report_id, &self.worker_id) {
                warn!(report_id, "Failed to release claim after timeout: {}", e);
            }
            return ProcessOutcome::Retry { error: message };
        }

        let report = match self.reports.get(report_id) {
            Ok(Some(report)) => report,
            Ok(None) => {
                return ProcessOutcome::Dropped {
                    reason: "report not found".to_string(),
                }
            }
            Err(e) => {
                error!(report_id, "Failed to load timed-out report: {}", e);
                return ProcessOutcome::Failed { error: message };
            }
        };

        if report.lease_owner.as_deref() == Some(self.worker_id.as_str()) {
            self.persist_failure(&report, Some(&self.worker_id), attempt, message)
                .await
        } else {
            self.persist_failure(&report, None, attempt, message).await
        }
    }

    /// Fail a report whose job died without a live worker. Only applies when
    /// no unexpired lease is held. Returns whether the report was failed.
    pub async fn fail_abandoned(&self, report_id: &str, reason: &str) -> bool {
        let report = match self.reports.get(report_id) {
            Ok(Some(report)) => report,
            Ok(None) => return false,
            Err(e) => {
                error!(report_id, "Failed to load abandoned report: {}", e);
                return false;
            }
        };
        if report.status.is_terminal() {
            return false;
        }
        let outcome = self
            .persist_failure(&report, None, Attempt::single(), sanitize_error(reason))
            .await;
        matches!(outcome, ProcessOutcome::Failed { .. })
    }

    /// Best-effort notification of the persisted state; the result is audited.
    async fn notify(&self, report: &Report, outcome: NotifyOutcome) {
        let current = match self.reports.get(&report.id) {
            Ok(Some(current)) => current,
            Ok(None) => report.clone(),
            Err(e) => {
                warn!(report_id = %report.id, "Notifying with stale report state: {}", e);
                report.clone()
            }
        };

        let result = self.notifier.notify(&current, outcome).await;
        let (delivered, error) = match result {
            Ok(()) => (true, None),
            Err(e) => {
                warn!(
                    report_id = %report.id,
                    notifier = self.notifier.name(),
                    "Notification failed: {}",
                    e
                );
                (false, Some(sanitize_error(&e.to_string())))
            }
        };
        metrics::NOTIFICATIONS
            .with_label_values(&[if delivered { "delivered" } else { "failed" }])
            .inc();

        self.audit.emit(AuditEvent::NotificationSent {
            report_id: report.id.clone(),
            tenant_id: report.tenant_id.clone(),
            outcome: outcome.to_string(),
            delivered,
            error,
        });
    }

    async fn discard_object(&self, key: &str) {
        if let Err(e) = self.objects.delete(key).await {
            warn!(key, "Failed to remove unused artifact: {}", e);
        }
    }
}

fn observe_stage(stage: &str, started: Instant) {
    metrics::STAGE_DURATION
        .with_label_values(&[stage])
        .observe(started.elapsed().as_secs_f64());
}

