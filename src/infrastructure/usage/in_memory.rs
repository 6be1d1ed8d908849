//! In-memory usage sink

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::usage::{UsageLogEntry, UsageSink};
use crate::domain::DomainError;

/// Keeps every entry in memory; used in tests and local runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsageSink {
    entries: Arc<RwLock<Vec<UsageLogEntry>>>,
}

impl InMemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<UsageLogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), DomainError> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

/// Emits each entry as a structured `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), DomainError> {
        let api_key_id = entry.api_key_id.map(|id| id.to_string());

        tracing::info!(
            target: "usage",
            id = %entry.id,
            api_key_id = api_key_id.as_deref(),
            user_id = entry.user_id.as_deref(),
            ip = %entry.ip_address,
            method = %entry.method,
            endpoint = %entry.endpoint,
            status = entry.status_code,
            response_time_ms = entry.response_time_ms,
            error = entry.error_message.as_deref(),
            "api request"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_keeps_order() {
        let sink = InMemoryUsageSink::new();

        sink.append(UsageLogEntry::new("10.0.0.1", "/v1/ping", "GET", 200))
            .await
            .unwrap();
        sink.append(UsageLogEntry::new("10.0.0.1", "/v1/ping", "GET", 429))
            .await
            .unwrap();

        let entries = sink.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status_code, 200);
        assert_eq!(entries[1].status_code, 429);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let entry = UsageLogEntry::new("10.0.0.1", "/v1/ping", "GET", 500).with_error("boom");
        assert!(TracingUsageSink.append(entry).await.is_ok());
    }
}
