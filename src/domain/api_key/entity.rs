//! API Key entity and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{validate_key_name, ApiKeyValidationError};
use crate::domain::auth::PermissionSet;
use crate::domain::DomainError;

/// API Key identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyId(Uuid);

impl ApiKeyId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for ApiKeyId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::validation(format!("Invalid API key id '{}'", s)))
    }
}

impl fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the principal that owns a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named quota class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyTier {
    #[default]
    Free,
    Basic,
    Premium,
}

impl ApiKeyTier {
    /// Default hourly request allowance for the tier
    pub fn default_rate_limit_per_hour(&self) -> u32 {
        match self {
            Self::Free => 100,
            Self::Basic => 1_000,
            Self::Premium => 10_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for ApiKeyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiKeyTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            other => Err(DomainError::validation(format!(
                "Unknown tier '{}'. Expected one of: free, basic, premium",
                other
            ))),
        }
    }
}

/// API Key entity
///
/// Holds only the digest of the secret; the raw secret exists solely in the
/// value returned from key creation. The entity deliberately does not
/// implement `Serialize`, responses go through dedicated DTOs.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKey {
    id: ApiKeyId,
    owner_id: OwnerId,
    name: String,
    /// Lowercase hex SHA-256 of the full secret
    key_hash: String,
    /// Leading characters of the secret, for display only
    key_prefix: String,
    tier: ApiKeyTier,
    rate_limit_per_hour: u32,
    permissions: PermissionSet,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Create a new active key with the tier's default quota
    pub fn new(
        owner_id: OwnerId,
        name: impl Into<String>,
        key_hash: impl Into<String>,
        key_prefix: impl Into<String>,
        tier: ApiKeyTier,
    ) -> Result<Self, ApiKeyValidationError> {
        let name = name.into().trim().to_string();
        validate_key_name(&name)?;

        Ok(Self {
            id: ApiKeyId::generate(),
            owner_id,
            name,
            key_hash: key_hash.into(),
            key_prefix: key_prefix.into(),
            tier,
            rate_limit_per_hour: tier.default_rate_limit_per_hour(),
            permissions: PermissionSet::new(),
            is_active: true,
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        })
    }

    /// Rebuild a key from persisted fields
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ApiKeyId,
        owner_id: OwnerId,
        name: String,
        key_hash: String,
        key_prefix: String,
        tier: ApiKeyTier,
        rate_limit_per_hour: u32,
        permissions: PermissionSet,
        is_active: bool,
        expires_at: Option<DateTime<Utc>>,
        last_used_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            name,
            key_hash,
            key_prefix,
            tier,
            rate_limit_per_hour,
            permissions,
            is_active,
            expires_at,
            last_used_at,
            created_at,
        }
    }

    pub fn with_rate_limit_per_hour(mut self, limit: u32) -> Self {
        self.rate_limit_per_hour = limit;
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_hash(&self) -> &str {
        &self.key_hash
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn tier(&self) -> ApiKeyTier {
        self.tier
    }

    pub fn rate_limit_per_hour(&self) -> u32 {
        self.rate_limit_per_hour
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_owned_by(&self, owner_id: &OwnerId) -> bool {
        &self.owner_id == owner_id
    }

    /// Check whether the key has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// A key is usable iff it is active and not expired
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }

    // Mutations

    pub fn revoke(&mut self) {
        self.is_active = false;
    }

    pub fn record_usage(&mut self, at: DateTime<Utc>) {
        self.last_used_at = Some(at);
    }
}
