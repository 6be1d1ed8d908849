//! Audit entry for one gateway request

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::api_key::ApiKeyId;
use crate::domain::auth::AuthContext;

/// Append-only usage record
///
/// Identity references are nullable: a request rejected before authentication
/// completed carries only the client IP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageLogEntry {
    pub id: Uuid,
    pub api_key_id: Option<ApiKeyId>,
    pub user_id: Option<String>,
    pub ip_address: String,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub user_agent: Option<String>,
    pub request_size: Option<u64>,
    pub response_size: Option<u64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsageLogEntry {
    pub fn new(
        ip_address: impl Into<String>,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            api_key_id: None,
            user_id: None,
            ip_address: ip_address.into(),
            endpoint: endpoint.into(),
            method: method.into(),
            status_code,
            response_time_ms: 0,
            user_agent: None,
            request_size: None,
            response_size: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// Copy the identity references out of a resolved context
    pub fn with_context(mut self, ctx: &AuthContext) -> Self {
        self.api_key_id = ctx.api_key_id().copied();
        self.user_id = ctx.user_id().map(str::to_string);
        self.ip_address = ctx.ip_address.clone();
        self
    }

    pub fn with_response_time_ms(mut self, ms: u64) -> Self {
        self.response_time_ms = ms;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_sizes(mut self, request_size: Option<u64>, response_size: Option<u64>) -> Self {
        self.request_size = request_size;
        self.response_size = response_size;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}
