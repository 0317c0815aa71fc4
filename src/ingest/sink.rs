use async_trait::async_trait;

use crate::record::LogRecord;
use crate::store::{LogStore, Result};

/// Destination of flushed batches
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Write all records or none
    async fn write_batch(&self, records: &[LogRecord]) -> Result<usize>;
}

#[async_trait]
impl RecordSink for LogStore {
    async fn write_batch(&self, records: &[LogRecord]) -> Result<usize> {
        LogStore::write_batch(self, records)
    }
}

/// Runs after every successful flush, before the flush returns
#[async_trait]
pub trait FlushHook: Send + Sync {
    async fn after_flush(&self, flushed: usize);

    /// Called when a write failed with `QuotaExceeded`, before the batch is
    /// requeued for another attempt
    async fn on_quota_exceeded(&self) {}
}
