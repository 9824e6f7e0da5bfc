use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inspectra_core::{
    analysis::{create_llm_client, AiEngine},
    artifact::PdfRenderer,
    audit::{AuditEvent, AuditHandle, AuditStore, SqliteAuditStore},
    create_authenticator,
    extract::PlainTextExtractor,
    load_config,
    notify::create_notifier,
    queue::{JobQueue, SqliteJobQueue},
    report::{ReportStore, SqliteReportStore},
    storage::{FsObjectStore, ObjectStore, UrlSigner},
    validate_config, Authenticator, LifecycleManager, ReportPipeline, WorkerPool,
};

use inspectra_server::{create_router, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("INSPECTRA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);
    info!("Object store root: {:?}", config.storage.root);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // SQLite stores share one database file
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    let audit = AuditHandle::new(audit_store);
    info!("Audit store initialized");

    let reports: Arc<dyn ReportStore> = Arc::new(
        SqliteReportStore::new(&config.database.path).context("Failed to create report store")?,
    );
    info!("Report store initialized");

    let queue: Arc<dyn JobQueue> = Arc::new(
        SqliteJobQueue::new(&config.database.path).context("Failed to create job queue")?,
    );
    info!("Job queue initialized");

    // Object storage
    let signer = UrlSigner::new(
        config.storage.signing_secret.clone(),
        config.storage.public_base_url.clone(),
    );
    let objects: Arc<dyn ObjectStore> =
        Arc::new(FsObjectStore::new(config.storage.root.clone(), signer.clone()));

    audit.emit(AuditEvent::ServiceStarted {
        version: VERSION.to_string(),
        config_hash: config_hash_short.to_string(),
    });
    info!("Emitted ServiceStarted audit event");

    // Processing pipeline
    let extractor = Arc::new(PlainTextExtractor::new(
        config.ingestion.allowed_extensions.clone(),
    ));
    let renderer = Arc::new(PdfRenderer::new(&config.artifact));
    if config.artifact.logo_path.is_some() && !renderer.has_logo() {
        warn!("Configured logo could not be loaded; rendering without it");
    }
    let notifier = create_notifier(&config.notifier);

    let mut pipeline = ReportPipeline::new(
        Arc::clone(&reports),
        Arc::clone(&objects),
        extractor,
        renderer,
        notifier,
        audit.clone(),
    )
    .with_lease(Duration::from_secs(config.worker.lease_secs));

    match &config.ai {
        Some(ai_config) => match create_llm_client(ai_config) {
            Ok(client) => {
                info!(
                    "Initializing AI analysis ({:?}, model {})",
                    ai_config.provider, ai_config.model
                );
                pipeline = pipeline.with_ai(Arc::new(AiEngine::new(client, ai_config)));
            }
            Err(e) => {
                error!("Failed to create LLM client, using rule engine only: {}", e);
            }
        },
        None => {
            info!("No AI provider configured, using rule engine only");
        }
    }

    let lifecycle = Arc::new(LifecycleManager::new(
        Arc::clone(&reports),
        Arc::clone(&objects),
        audit.clone(),
        &config.lifecycle,
    ));

    // Workers
    let worker_pool = if config.worker.enabled {
        let pool = WorkerPool::new(pipeline, Arc::clone(&queue), config.worker.clone())
            .with_lifecycle(
                Arc::clone(&lifecycle),
                Duration::from_secs(config.lifecycle.purge_interval_secs),
            );
        pool.start().await;
        info!("Worker pool started ({} workers)", config.worker.workers);
        Some(Arc::new(pool))
    } else {
        info!("Workers disabled in config; jobs are queued only");
        None
    };

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        audit.clone(),
        reports,
        objects,
        signer,
        queue,
        lifecycle,
        worker_pool.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // In-flight jobs finish or are redelivered after their lease
    if let Some(ref pool) = worker_pool {
        info!("Stopping worker pool...");
        pool.stop().await;
        info!("Worker pool stopped");
    }

    info!("Server shutting down...");
    audit.emit(AuditEvent::ServiceStopped {
        reason: "graceful_shutdown".to_string(),
    });

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
