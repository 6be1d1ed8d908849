//! Usage sink collaborator

use async_trait::async_trait;

use super::entry::UsageLogEntry;
use crate::domain::DomainError;

/// Append-only destination for usage entries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), DomainError>;
}
