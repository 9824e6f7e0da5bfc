use std::sync::Arc;

use inspectra_core::{
    audit::AuditHandle,
    queue::JobQueue,
    report::ReportStore,
    storage::{ObjectStore, UrlSigner},
    Authenticator, Config, DownloadAuthorizer, IngestionService, LifecycleManager,
    SanitizedConfig, WorkerPool,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit: AuditHandle,
    reports: Arc<dyn ReportStore>,
    objects: Arc<dyn ObjectStore>,
    signer: UrlSigner,
    queue: Arc<dyn JobQueue>,
    ingestion: IngestionService,
    downloads: DownloadAuthorizer,
    lifecycle: Arc<LifecycleManager>,
    worker_pool: Option<Arc<WorkerPool>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit: AuditHandle,
        reports: Arc<dyn ReportStore>,
        objects: Arc<dyn ObjectStore>,
        signer: UrlSigner,
        queue: Arc<dyn JobQueue>,
        lifecycle: Arc<LifecycleManager>,
        worker_pool: Option<Arc<WorkerPool>>,
    ) -> Self {
        let ingestion = IngestionService::new(
            Arc::clone(&reports),
            Arc::clone(&objects),
            Arc::clone(&queue),
            audit.clone(),
            &config.ingestion,
            &config.worker,
        );
        let downloads = DownloadAuthorizer::new(
            Arc::clone(&reports),
            Arc::clone(&objects),
            audit.clone(),
            std::time::Duration::from_secs(config.storage.presign_ttl_secs),
        );
        Self {
            config,
            authenticator,
            audit,
            reports,
            objects,
            signer,
            queue,
            ingestion,
            downloads,
            lifecycle,
            worker_pool,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn reports(&self) -> &Arc<dyn ReportStore> {
        &self.reports
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn ingestion(&self) -> &IngestionService {
        &self.ingestion
    }

    pub fn downloads(&self) -> &DownloadAuthorizer {
        &self.downloads
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn worker_pool(&self) -> Option<&Arc<WorkerPool>> {
        self.worker_pool.as_ref()
    }
}
