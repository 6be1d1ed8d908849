//! Fire-and-forget usage recording
//!
//! Entries are queued on a bounded channel and appended to the sink by a
//! background task. A full queue or a failing sink never affects the
//! request that produced the entry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::usage::{UsageLogEntry, UsageSink};
use crate::infrastructure::observability::record_usage_dropped;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Handle used by the gateway to submit usage entries
#[derive(Debug, Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<UsageLogEntry>,
}

impl UsageRecorder {
    /// Start the background writer for `sink`
    ///
    /// The writer drains remaining entries and exits once every recorder
    /// handle has been dropped.
    pub fn spawn(sink: Arc<dyn UsageSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (recorder, mut rx) = Self::channel(capacity);

        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let id = entry.id;

                if let Err(e) = sink.append(entry).await {
                    warn!(entry_id = %id, error = %e, "Failed to write usage log entry");
                }
            }
            debug!("Usage recorder stopped");
        });

        (recorder, handle)
    }

    fn channel(capacity: usize) -> (Self, mpsc::Receiver<UsageLogEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue an entry; returns false when it was dropped
    pub fn record(&self, entry: UsageLogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(endpoint = %entry.endpoint, "Usage queue full, dropping entry");
                record_usage_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                warn!(endpoint = %entry.endpoint, "Usage recorder stopped, dropping entry");
                record_usage_dropped();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::usage::MockUsageSink;
    use crate::domain::DomainError;
    use crate::infrastructure::usage::InMemoryUsageSink;

    fn entry(status: u16) -> UsageLogEntry {
        UsageLogEntry::new("10.0.0.1", "/v1/ping", "GET", status)
    }

    #[tokio::test]
    async fn test_entries_reach_sink() {
        let sink = Arc::new(InMemoryUsageSink::new());
        let (recorder, handle) = UsageRecorder::spawn(sink.clone(), 16);

        assert!(recorder.record(entry(200)));
        assert!(recorder.record(entry(401)));

        drop(recorder);
        handle.await.unwrap();

        let statuses: Vec<u16> = sink.entries().await.iter().map(|e| e.status_code).collect();
        assert_eq!(statuses, vec![200, 401]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let mut sink = MockUsageSink::new();
        sink.expect_append()
            .times(2)
            .returning(|_| Err(DomainError::storage("disk full")));

        let (recorder, handle) = UsageRecorder::spawn(Arc::new(sink), 4);

        assert!(recorder.record(entry(200)));
        assert!(recorder.record(entry(200)));

        drop(recorder);
        handle.await.unwrap();
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (recorder, _rx) = UsageRecorder::channel(1);

        assert!(recorder.record(entry(200)));
        assert!(!recorder.record(entry(200)));
    }

    #[test]
    fn test_closed_queue_drops() {
        let (recorder, rx) = UsageRecorder::channel(4);
        drop(rx);

        assert!(!recorder.record(entry(200)));
    }
}
