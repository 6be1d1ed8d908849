//! Request-scoped authentication context

use serde::Serialize;

use super::permission::{has_permission, PermissionSet, Role};
use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyTier, OwnerId};

/// Principal authenticated through an API key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiKeyPrincipal {
    pub key_id: ApiKeyId,
    pub owner_id: OwnerId,
    pub key_prefix: String,
    pub tier: ApiKeyTier,
}

impl From<&ApiKey> for ApiKeyPrincipal {
    fn from(key: &ApiKey) -> Self {
        Self {
            key_id: *key.id(),
            owner_id: key.owner_id().clone(),
            key_prefix: key.key_prefix().to_string(),
            tier: key.tier(),
        }
    }
}

/// Principal authenticated through a bearer token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPrincipal {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
}

/// Who the request is made on behalf of
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identity {
    ApiKey(ApiKeyPrincipal),
    User(UserPrincipal),
    Anonymous,
}

impl Identity {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::User(_) => "user",
            Self::Anonymous => "anonymous",
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

/// Resolved identity, permissions and quota class attached to one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthContext {
    pub identity: Identity,
    pub permissions: PermissionSet,
    pub rate_limit_tier: ApiKeyTier,
    pub rate_limit_per_hour: u32,
    pub ip_address: String,
}

impl AuthContext {
    pub fn anonymous(ip_address: impl Into<String>, tier: ApiKeyTier) -> Self {
        Self {
            identity: Identity::Anonymous,
            permissions: Role::Public.permissions(),
            rate_limit_tier: tier,
            rate_limit_per_hour: tier.default_rate_limit_per_hour(),
            ip_address: ip_address.into(),
        }
    }

    pub fn for_api_key(
        key: &ApiKey,
        permissions: PermissionSet,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            identity: Identity::ApiKey(ApiKeyPrincipal::from(key)),
            permissions,
            rate_limit_tier: key.tier(),
            rate_limit_per_hour: key.rate_limit_per_hour(),
            ip_address: ip_address.into(),
        }
    }

    pub fn for_user(user: UserPrincipal, tier: ApiKeyTier, ip_address: impl Into<String>) -> Self {
        Self {
            permissions: user.role.permissions(),
            identity: Identity::User(user),
            rate_limit_tier: tier,
            rate_limit_per_hour: tier.default_rate_limit_per_hour(),
            ip_address: ip_address.into(),
        }
    }

    pub fn api_key_id(&self) -> Option<&ApiKeyId> {
        match &self.identity {
            Identity::ApiKey(principal) => Some(&principal.key_id),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.identity {
            Identity::User(user) => Some(&user.user_id),
            _ => None,
        }
    }

    pub fn has_permission(&self, required: &str) -> bool {
        has_permission(&self.permissions, required)
    }

    /// Fails with [`PermissionDenied`] unless the context grants `required`
    pub fn require(&self, required: &str) -> Result<(), PermissionDenied> {
        if self.has_permission(required) {
            Ok(())
        } else {
            Err(PermissionDenied {
                permission: required.to_string(),
            })
        }
    }
}

/// A capability the caller does not hold
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing permission '{permission}'")]
pub struct PermissionDenied {
    pub permission: String,
}
