//! Public liveness endpoint behind the gateway

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::extract::Auth;
use crate::api::types::{ApiError, Json};

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: &'static str,
    pub identity: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// GET /v1/ping
pub async fn ping(auth: Auth) -> Result<Json<PingResponse>, ApiError> {
    auth.require("read:public")?;

    Ok(Json(PingResponse {
        message: "pong",
        identity: auth.identity.kind(),
        timestamp: Utc::now(),
    }))
}
