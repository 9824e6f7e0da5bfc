pub mod analysis;
pub mod artifact;
pub mod audit;
pub mod auth;
pub mod config;
pub mod download;
pub mod extract;
pub mod ingest;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod queue;
pub mod report;
pub mod storage;
pub mod testing;

pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use download::{DownloadAuthorizer, DownloadError, DownloadGrant};
pub use ingest::{IngestError, IngestionService};
pub use lifecycle::{LifecycleManager, PurgeSummary};
pub use orchestrator::{Attempt, ProcessOutcome, ReportPipeline, WorkerPool};
