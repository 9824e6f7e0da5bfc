use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::report::Requester;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Authenticated identity, always bound to one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub tenant_id: String,
    pub method: String,
    /// Elevated identities read across all tenants.
    pub elevated: bool,
}

impl Identity {
    /// Anonymous identity used when authentication is disabled.
    pub fn anonymous(tenant_id: impl Into<String>) -> Self {
        Self {
            user_id: "anonymous".to_string(),
            tenant_id: tenant_id.into(),
            method: "none".to_string(),
            elevated: true,
        }
    }

    /// The requester used for scope resolution on report read paths.
    pub fn requester(&self) -> Requester {
        Requester {
            user_id: self.user_id.clone(),
            tenant_id: self.tenant_id.clone(),
            elevated: self.elevated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Scope;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous("default");
        assert_eq!(identity.user_id, "anonymous");
        assert_eq!(identity.tenant_id, "default");
        assert_eq!(identity.method, "none");
        assert!(identity.elevated);
    }

    #[test]
    fn test_requester_scope_follows_elevation() {
        let identity = Identity {
            user_id: "alice".to_string(),
            tenant_id: "acme".to_string(),
            method: "api_key".to_string(),
            elevated: false,
        };
        let requester = identity.requester();
        assert_eq!(requester.user_id, "alice");
        assert_eq!(requester.scope(), Scope::Tenant("acme".to_string()));

        let admin = Identity {
            elevated: true,
            ..identity
        };
        assert_eq!(admin.requester().scope(), Scope::All);
    }

    #[test]
    fn test_identity_serialization() {
        let identity = Identity {
            user_id: "user123".to_string(),
            tenant_id: "acme".to_string(),
            method: "api_key".to_string(),
            elevated: false,
        };

        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: Identity = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.user_id, "user123");
        assert_eq!(deserialized.tenant_id, "acme");
        assert!(!deserialized.elevated);
    }
}
