use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that accepts all requests as anonymous members of one tenant.
/// Must be explicitly configured - the system won't default to this
pub struct NoneAuthenticator {
    tenant_id: String,
}

impl NoneAuthenticator {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }
}

impl Default for NoneAuthenticator {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous(self.tenant_id.clone()))
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::IpAddr;

    #[tokio::test]
    async fn test_none_authenticator_returns_anonymous() {
        let auth = NoneAuthenticator::new("acme");
        let request = AuthRequest {
            headers: HashMap::new(),
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        };

        let identity = auth.authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "anonymous");
        assert_eq!(identity.tenant_id, "acme");
        assert_eq!(identity.method, "none");
    }

    #[test]
    fn test_none_authenticator_default() {
        let auth = NoneAuthenticator::default();
        assert_eq!(auth.method_name(), "none");
        assert_eq!(auth.tenant_id, "default");
    }
}
