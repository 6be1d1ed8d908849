//! Extractors for the context resolved by the gateway

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use super::types::ApiError;
use crate::domain::auth::{AuthContext, Identity, UserPrincipal};

/// The [`AuthContext`] the gateway attached to this request
#[derive(Debug, Clone)]
pub struct Auth(pub AuthContext);

impl Auth {
    /// Rejects anonymous callers with 401 `authentication_required`
    pub fn authenticated(&self) -> Result<&AuthContext, ApiError> {
        if self.0.identity.is_anonymous() {
            return Err(ApiError::authentication_required(
                "This endpoint requires an API key or bearer token",
            ));
        }
        Ok(&self.0)
    }

    /// The signed-in user behind a bearer token
    ///
    /// Anonymous callers get 401; API-key callers get 403.
    pub fn user(&self) -> Result<&UserPrincipal, ApiError> {
        match &self.0.identity {
            Identity::User(user) => Ok(user),
            Identity::ApiKey(_) => Err(ApiError::forbidden(
                "API keys cannot be used to manage API keys",
            )),
            Identity::Anonymous => Err(ApiError::authentication_required(
                "This endpoint requires a bearer token",
            )),
        }
    }

    /// 403 `forbidden` unless the context grants `permission`
    pub fn require(&self, permission: &str) -> Result<(), ApiError> {
        self.0.require(permission).map_err(ApiError::from)
    }
}

impl std::ops::Deref for Auth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(ctx) => Ok(Auth(ctx.clone())),
            None => {
                error!(path = %parts.uri.path(), "Handler reached without gateway middleware");
                Err(ApiError::internal())
            }
        }
    }
}
