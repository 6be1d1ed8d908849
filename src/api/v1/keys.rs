//! Key management endpoints for the signed-in user

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

use crate::api::extract::Auth;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyTier, OwnerId};
use crate::domain::auth::{PermissionSet, SUPERUSER_PERMISSION};
use crate::infrastructure::api_key::CreateApiKeyParams;

const READ_KEYS: &str = "read:keys:own";
const WRITE_KEYS: &str = "write:keys:own";

/// POST /v1/keys body
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateKeyRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub rate_limit_per_hour: Option<u32>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Key metadata; never carries the digest or the secret
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: ApiKeyId,
    pub name: String,
    pub key_prefix: String,
    pub tier: ApiKeyTier,
    pub rate_limit_per_hour: u32,
    pub permissions: PermissionSet,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&ApiKey> for ApiKeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: *key.id(),
            name: key.name().to_string(),
            key_prefix: key.key_prefix().to_string(),
            tier: key.tier(),
            rate_limit_per_hour: key.rate_limit_per_hour(),
            permissions: key.permissions().clone(),
            is_active: key.is_active(),
            expires_at: key.expires_at(),
            last_used_at: key.last_used_at(),
            created_at: key.created_at(),
        }
    }
}

/// Creation response, the only place the secret ever appears
#[derive(Debug, Clone, Serialize)]
pub struct CreatedKeyResponse {
    #[serde(flatten)]
    pub api_key: ApiKeyResponse,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListKeysResponse {
    pub api_keys: Vec<ApiKeyResponse>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedKeyResponse {
    pub deleted: bool,
    pub id: ApiKeyId,
}

/// Owner of the keys managed by this request, after the permission check
fn owner_for(auth: &Auth, permission: &str) -> Result<OwnerId, ApiError> {
    let user = auth.user()?;
    auth.require(permission)?;
    Ok(OwnerId::new(user.user_id.clone()))
}

/// A new key may carry only permissions its creator holds, and a quota
/// above its tier's default only when created by a superuser
fn check_key_grants(
    auth: &Auth,
    request: &CreateKeyRequest,
    tier: ApiKeyTier,
) -> Result<(), ApiError> {
    for permission in &request.permissions {
        auth.require(permission)?;
    }

    if let Some(limit) = request.rate_limit_per_hour {
        let ceiling = tier.default_rate_limit_per_hour();
        if limit > ceiling && !auth.has_permission(SUPERUSER_PERMISSION) {
            return Err(ApiError::forbidden(format!(
                "rate_limit_per_hour may not exceed {} for the {} tier",
                ceiling, tier
            )));
        }
    }

    Ok(())
}

fn parse_key_id(raw: &str) -> Result<ApiKeyId, ApiError> {
    raw.parse::<ApiKeyId>().map_err(ApiError::from)
}

/// POST /v1/keys
pub async fn create_key(
    State(state): State<AppState>,
    auth: Auth,
    Json(request): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<CreatedKeyResponse>), ApiError> {
    let owner_id = owner_for(&auth, WRITE_KEYS)?;

    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let tier = match request.tier.as_deref() {
        Some(raw) => raw.parse::<ApiKeyTier>()?,
        None => ApiKeyTier::default(),
    };

    check_key_grants(&auth, &request, tier)?;

    debug!(owner_id = %owner_id, tier = %tier, "Creating API key");

    let mut params = CreateApiKeyParams::new(owner_id, request.name, tier)
        .with_permissions(request.permissions.into_iter().collect());
    if let Some(expires_at) = request.expires_at {
        params = params.with_expiration(expires_at);
    }
    if let Some(limit) = request.rate_limit_per_hour {
        params = params.with_rate_limit_per_hour(limit);
    }

    let created = state.api_keys.create_key_with(params).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedKeyResponse {
            api_key: ApiKeyResponse::from(&created.api_key),
            secret: created.secret,
        }),
    ))
}

/// GET /v1/keys
pub async fn list_keys(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<ListKeysResponse>, ApiError> {
    let owner_id = owner_for(&auth, READ_KEYS)?;

    let keys = state.api_keys.list_keys(&owner_id).await?;
    let api_keys: Vec<ApiKeyResponse> = keys.iter().map(ApiKeyResponse::from).collect();
    let total = api_keys.len();

    Ok(Json(ListKeysResponse { api_keys, total }))
}

/// GET /v1/keys/{key_id}
pub async fn get_key(
    State(state): State<AppState>,
    auth: Auth,
    Path(key_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let owner_id = owner_for(&auth, READ_KEYS)?;
    let key_id = parse_key_id(&key_id)?;

    let key = state.api_keys.get_key(&key_id, &owner_id).await?;

    Ok(Json(ApiKeyResponse::from(&key)))
}

/// POST /v1/keys/{key_id}/revoke
pub async fn revoke_key(
    State(state): State<AppState>,
    auth: Auth,
    Path(key_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, ApiError> {
    let owner_id = owner_for(&auth, WRITE_KEYS)?;
    let key_id = parse_key_id(&key_id)?;

    let key = state.api_keys.revoke_key(&key_id, &owner_id).await?;

    Ok(Json(ApiKeyResponse::from(&key)))
}

/// DELETE /v1/keys/{key_id}
pub async fn delete_key(
    State(state): State<AppState>,
    auth: Auth,
    Path(key_id): Path<String>,
) -> Result<Json<DeletedKeyResponse>, ApiError> {
    let owner_id = owner_for(&auth, WRITE_KEYS)?;
    let key_id = parse_key_id(&key_id)?;

    state.api_keys.delete_key(&key_id, &owner_id).await?;

    Ok(Json(DeletedKeyResponse {
        deleted: true,
        id: key_id,
    }))
}
