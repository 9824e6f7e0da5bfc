use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub ai: Option<AiConfig>,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub artifact: ArtifactConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Keys accepted by the `api_key` method, each bound to one tenant.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
    /// Tenant assigned to anonymous requests when `method = "none"`.
    #[serde(default = "default_tenant")]
    pub default_tenant: String,
}

fn default_tenant() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// One API key and the identity it authenticates as.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyEntry {
    pub key: String,
    pub user_id: String,
    pub tenant_id: String,
    /// Elevated keys see every tenant.
    #[serde(default)]
    pub elevated: bool,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("inspectra.db")
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Externally reachable base URL used when signing download links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Secret used to sign download links.
    #[serde(default)]
    pub signing_secret: String,
    /// Lifetime of signed download links in seconds.
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: default_public_base_url(),
            signing_secret: String::new(),
            presign_ttl_secs: default_presign_ttl(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("objects")
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_presign_ttl() -> u64 {
    900
}

/// Background worker and job queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// When disabled, jobs are queued but never processed by this instance.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of worker loops, each handling one job at a time.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// How often an idle worker polls the queue (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Deliveries per job before it is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-job timeout in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Lifetime of the per-report processing lease in seconds.
    /// Must not be shorter than the job timeout.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,
    /// Delay before a retried job becomes visible again (multiplied by attempt).
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: default_workers(),
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            job_timeout_secs: default_job_timeout(),
            lease_secs: default_lease(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_job_timeout() -> u64 {
    300
}

fn default_lease() -> u64 {
    360
}

fn default_retry_backoff() -> u64 {
    30
}

/// Soft-delete retention and purge sweep configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
    /// Days a soft-deleted report is kept before being purged.
    #[serde(default = "default_grace_period")]
    pub grace_period_days: u32,
    /// How often the purge sweep runs (seconds).
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
    /// Maximum candidates handled per sweep.
    #[serde(default = "default_purge_batch")]
    pub purge_batch_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period(),
            purge_interval_secs: default_purge_interval(),
            purge_batch_size: default_purge_batch(),
        }
    }
}

fn default_grace_period() -> u32 {
    30
}

fn default_purge_interval() -> u64 {
    3600
}

fn default_purge_batch() -> usize {
    100
}

/// LLM provider type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Claude API.
    Anthropic,
    /// OpenAI API or any compatible endpoint.
    OpenAi,
    /// Local Ollama instance.
    Ollama,
}

/// AI analysis engine configuration. When absent only the rule engine runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Extracted text beyond this many characters is not sent to the model.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Replaces the built-in instruction for every tenant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// Per-tenant instruction overrides keyed by tenant id.
    #[serde(default)]
    pub tenant_instructions: HashMap<String, String>,
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_max_input_chars() -> usize {
    60_000
}

/// Outcome notification configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// When set, outcomes are POSTed here as JSON; otherwise they are only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
    /// Extra recipients copied on every notification.
    #[serde(default)]
    pub admin_recipients: Vec<String>,
}

fn default_notify_timeout() -> u64 {
    10
}

/// Conclusion document rendering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Optional JPEG logo drawn in the page header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<PathBuf>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            title: default_artifact_title(),
            organization: None,
            logo_path: None,
            max_pages: default_max_pages(),
        }
    }
}

fn default_artifact_title() -> String {
    "Inspection Conclusion".to_string()
}

fn default_max_pages() -> usize {
    50
}

/// Upload validation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_max_upload() -> u64 {
    20 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["txt".to_string(), "md".to_string(), "csv".to_string()]
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: SanitizedStorageConfig,
    pub worker: WorkerConfig,
    pub lifecycle: LifecycleConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<SanitizedAiConfig>,
    pub notifier: SanitizedNotifierConfig,
    pub artifact: ArtifactConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_keys_configured: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub root: PathBuf,
    pub public_base_url: String,
    pub signing_secret_configured: bool,
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAiConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub api_key_configured: bool,
    pub tenant_overrides: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    pub webhook_configured: bool,
    pub admin_recipients: usize,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_keys_configured: config.auth.api_keys.len(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            storage: SanitizedStorageConfig {
                root: config.storage.root.clone(),
                public_base_url: config.storage.public_base_url.clone(),
                signing_secret_configured: !config.storage.signing_secret.is_empty(),
                presign_ttl_secs: config.storage.presign_ttl_secs,
            },
            worker: config.worker.clone(),
            lifecycle: config.lifecycle.clone(),
            ai: config.ai.as_ref().map(|ai| SanitizedAiConfig {
                provider: ai.provider.clone(),
                model: ai.model.clone(),
                api_key_configured: ai.api_key.as_ref().is_some_and(|k| !k.is_empty()),
                tenant_overrides: ai.tenant_instructions.len(),
            }),
            notifier: SanitizedNotifierConfig {
                webhook_configured: config.notifier.webhook_url.is_some(),
                admin_recipients: config.notifier.admin_recipients.len(),
            },
            artifact: config.artifact.clone(),
            ingestion: config.ingestion.clone(),
        }
    }
}
