use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Authentication service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AuthError {
    /// The caller's fault (401) rather than the service's (500).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::InvalidCredentials(_))
    }

    /// Short label for failure metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::ServiceUnavailable(_) => "unavailable",
            Self::ConfigurationError(_) => "misconfigured",
        }
    }
}

/// Resolves a request to an identity bound to exactly one tenant.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Name of this authentication method
    fn method_name(&self) -> &'static str;
}
