//! Echo of the resolved identity

use crate::api::extract::Auth;
use crate::api::types::{ApiError, Json};
use crate::domain::auth::AuthContext;

/// GET /v1/whoami
pub async fn whoami(auth: Auth) -> Result<Json<AuthContext>, ApiError> {
    let ctx = auth.authenticated()?;
    Ok(Json(ctx.clone()))
}
