use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

const MIN_SIGNING_SECRET_LEN: usize = 16;

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde)
/// - Server port is not 0
/// - API keys are present, unique and tenant-bound when `method = "api_key"`
/// - Signing secret is long enough
/// - Worker counts and attempts are positive
/// - Processing lease outlives the job timeout
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Auth validation
    if config.auth.method == AuthMethod::ApiKey {
        if config.auth.api_keys.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.api_keys must not be empty when method is api_key".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &config.auth.api_keys {
            if entry.key.is_empty() || entry.tenant_id.is_empty() || entry.user_id.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "auth.api_keys entry for user '{}' needs key, user_id and tenant_id",
                    entry.user_id
                )));
            }
            if !seen.insert(entry.key.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "auth.api_keys contains a duplicate key (user '{}')",
                    entry.user_id
                )));
            }
        }
    }
    if config.auth.default_tenant.is_empty() {
        return Err(ConfigError::ValidationError(
            "auth.default_tenant cannot be empty".to_string(),
        ));
    }

    // Storage validation
    if config.storage.signing_secret.len() < MIN_SIGNING_SECRET_LEN {
        return Err(ConfigError::ValidationError(format!(
            "storage.signing_secret must be at least {} characters",
            MIN_SIGNING_SECRET_LEN
        )));
    }
    if config.storage.presign_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "storage.presign_ttl_secs must be greater than 0".to_string(),
        ));
    }

    // Worker validation
    let worker = &config.worker;
    if worker.workers == 0 {
        return Err(ConfigError::ValidationError(
            "worker.workers must be at least 1".to_string(),
        ));
    }
    if worker.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "worker.max_attempts must be at least 1".to_string(),
        ));
    }
    if worker.job_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "worker.job_timeout_secs must be greater than 0".to_string(),
        ));
    }
    if worker.lease_secs < worker.job_timeout_secs {
        return Err(ConfigError::ValidationError(format!(
            "worker.lease_secs ({}) must be >= worker.job_timeout_secs ({})",
            worker.lease_secs, worker.job_timeout_secs
        )));
    }

    // Artifact validation
    if config.artifact.max_pages == 0 {
        return Err(ConfigError::ValidationError(
            "artifact.max_pages must be at least 1".to_string(),
        ));
    }

    // Ingestion validation
    if config.ingestion.max_upload_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "ingestion.max_upload_bytes must be greater than 0".to_string(),
        ));
    }
    if config.ingestion.allowed_extensions.is_empty() {
        return Err(ConfigError::ValidationError(
            "ingestion.allowed_extensions cannot be empty".to_string(),
        ));
    }

    Ok(())
}
