use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bon::Builder;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::sink::{FlushHook, RecordSink};
use crate::observability::Metrics;
use crate::record::LogRecord;
use crate::store::{Result, StoreError};

pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Clone, Copy, Builder)]
pub struct BatcherConfig {
    #[builder(default = DEFAULT_FLUSH_DELAY)]
    pub flush_delay: Duration,
    /// Failed attempts on one batch before it is dropped
    #[builder(default = DEFAULT_MAX_CONSECUTIVE_FAILURES)]
    pub max_consecutive_failures: u32,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,
    Flushed(usize),
    /// Write failed with a retryable error or a full store; records are back
    /// at the head
    Requeued(usize),
    /// Records were discarded, either non-retryable or out of attempts
    Dropped(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub flushed: u64,
    pub dropped: u64,
    pub failed_flushes: u64,
    pub pending: usize,
}

/// Timer-driven write-behind buffer in front of a [`RecordSink`]
///
/// The first record into an idle buffer schedules one flush after
/// `flush_delay`. Flushes are serialized; a retryable failure puts the batch
/// back at the head of the buffer and schedules another attempt.
#[derive(Clone)]
pub struct IngestBatcher {
    inner: Arc<Inner>,
}

struct Inner {
    sink: Arc<dyn RecordSink>,
    hook: Option<Arc<dyn FlushHook>>,
    config: BatcherConfig,
    metrics: Arc<Metrics>,
    buffer: Mutex<VecDeque<LogRecord>>,
    timer_pending: AtomicBool,
    closed: AtomicBool,
    flush_lock: tokio::sync::Mutex<()>,
    consecutive_failures: AtomicU32,
    flushed: AtomicU64,
    dropped: AtomicU64,
    failed_flushes: AtomicU64,
}

impl IngestBatcher {
    pub fn new(
        sink: Arc<dyn RecordSink>,
        hook: Option<Arc<dyn FlushHook>>,
        config: BatcherConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                hook,
                config,
                metrics,
                buffer: Mutex::new(VecDeque::new()),
                timer_pending: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                flush_lock: tokio::sync::Mutex::new(()),
                consecutive_failures: AtomicU32::new(0),
                flushed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                failed_flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Queue a record. Must be called from within a tokio runtime.
    pub fn submit(&self, record: LogRecord) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StoreError::StoreUnavailable(
                "ingest pipeline is shut down".to_string(),
            ));
        }
        self.inner.buffer.lock().push_back(record);
        self.inner.metrics.record_submitted();
        self.inner.schedule_flush();
        Ok(())
    }

    /// Flush immediately instead of waiting for the timer
    pub async fn flush_now(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    pub fn pending(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Drop everything still buffered. Returns how many records were discarded.
    pub fn discard_pending(&self) -> usize {
        let discarded = {
            let mut buffer = self.inner.buffer.lock();
            let n = buffer.len();
            buffer.clear();
            n
        };
        if discarded > 0 {
            self.inner.dropped.fetch_add(discarded as u64, Ordering::Relaxed);
            self.inner.metrics.records_dropped(discarded as u64);
        }
        discarded
    }

    /// Stop accepting records and drain the buffer. Retries follow the usual
    /// failure bound, so this always terminates.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        loop {
            match self.inner.flush().await {
                FlushOutcome::Empty => break,
                FlushOutcome::Flushed(_) | FlushOutcome::Dropped(_) => {}
                FlushOutcome::Requeued(_) => {
                    tokio::time::sleep(self.inner.config.flush_delay).await
                }
            }
        }
        debug!("Ingest batcher shut down");
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            flushed: self.inner.flushed.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            failed_flushes: self.inner.failed_flushes.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

impl Inner {
    fn schedule_flush(self: &Arc<Self>) {
        if self.closed.load(Ordering::Acquire) || self.timer_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.flush_delay).await;
            inner.timer_pending.store(false, Ordering::Release);
            // shutdown() drains the buffer itself
            if inner.closed.load(Ordering::Acquire) {
                return;
            }
            inner.flush().await;
        });
    }

    async fn flush(self: &Arc<Self>) -> FlushOutcome {
        let _guard = self.flush_lock.lock().await;

        let batch: Vec<LogRecord> = self.buffer.lock().drain(..).collect();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let size = batch.len();

        match self.sink.write_batch(&batch).await {
            Ok(written) => {
                self.consecutive_failures.store(0, Ordering::Release);
                self.flushed.fetch_add(written as u64, Ordering::Relaxed);
                self.metrics.records_flushed(written as u64);
                debug!(written, "Flushed batch");

                if let Some(hook) = &self.hook {
                    hook.after_flush(written).await;
                }
                FlushOutcome::Flushed(written)
            }
            Err(e) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                self.metrics.flush_failed();
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

                let quota_exceeded = matches!(e, StoreError::QuotaExceeded);
                let retryable = e.is_retryable() || quota_exceeded;
                if !retryable || failures >= self.config.max_consecutive_failures {
                    self.consecutive_failures.store(0, Ordering::Release);
                    self.dropped.fetch_add(size as u64, Ordering::Relaxed);
                    self.metrics.records_dropped(size as u64);
                    error!(dropped = size, failures, error = %e, "Dropping log batch");
                    return FlushOutcome::Dropped(size);
                }

                if quota_exceeded {
                    if let Some(hook) = &self.hook {
                        hook.on_quota_exceeded().await;
                    }
                }

                {
                    let mut buffer = self.buffer.lock();
                    for record in batch.into_iter().rev() {
                        buffer.push_front(record);
                    }
                }
                warn!(
                    records = size,
                    failures,
                    max = self.config.max_consecutive_failures,
                    error = %e,
                    "Flush failed, will retry"
                );
                self.schedule_flush();
                FlushOutcome::Requeued(size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::LogLevel;
    use crate::store::LogStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Fails the first `failures` writes with `error`, then writes to the store
    struct FlakySink {
        store: LogStore,
        failures: AtomicUsize,
        error: fn() -> StoreError,
        calls: AtomicUsize,
        written: Mutex<Vec<String>>,
    }

    impl FlakySink {
        fn new(store: LogStore, failures: usize, error: fn() -> StoreError) -> Arc<Self> {
            Arc::new(Self {
                store,
                failures: AtomicUsize::new(failures),
                error,
                calls: AtomicUsize::new(0),
                written: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RecordSink for FlakySink {
        async fn write_batch(&self, records: &[LogRecord]) -> Result<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err((self.error)());
            }
            let n = self.store.write_batch(records)?;
            self.written
                .lock()
                .extend(records.iter().map(|r| r.id.clone()));
            Ok(n)
        }
    }

    #[derive(Default)]
    struct CountingHook {
        calls: AtomicUsize,
        records: AtomicUsize,
        quota_calls: AtomicUsize,
    }

    #[async_trait]
    impl FlushHook for CountingHook {
        async fn after_flush(&self, flushed: usize) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records.fetch_add(flushed, Ordering::SeqCst);
        }

        async fn on_quota_exceeded(&self) {
            self.quota_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn outage() -> StoreError {
        StoreError::StoreUnavailable("disk offline".to_string())
    }

    fn invalid() -> StoreError {
        StoreError::InvalidInput("bad record".to_string())
    }

    fn disk_full() -> StoreError {
        StoreError::QuotaExceeded
    }

    fn create_test_store() -> (LogStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = LogStore::open_with_clock(temp_dir.path().join("ingest"), clock).unwrap();
        (store, temp_dir)
    }

    fn record(id: &str) -> LogRecord {
        LogRecord::capture(id, 100, LogLevel::Log, "m", "https://x.com", "1")
    }

    fn batcher(
        sink: Arc<dyn RecordSink>,
        hook: Option<Arc<dyn FlushHook>>,
        max: u32,
    ) -> IngestBatcher {
        let config = BatcherConfig::builder().max_consecutive_failures(max).build();
        IngestBatcher::new(sink, hook, config, Arc::new(Metrics::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_buffered_records() {
        let (store, _temp) = create_test_store();
        let batcher = batcher(Arc::new(store.clone()), None, 5);

        batcher.submit(record("a")).unwrap();
        batcher.submit(record("b")).unwrap();
        assert_eq!(batcher.pending(), 2);
        assert_eq!(store.count().unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(batcher.pending(), 0);
        assert_eq!(batcher.stats().flushed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_outage_without_duplicates() {
        let (store, _temp) = create_test_store();
        let sink = FlakySink::new(store.clone(), 2, outage);
        let batcher = batcher(sink.clone(), None, 5);

        batcher.submit(record("a")).unwrap();
        batcher.submit(record("b")).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(*sink.written.lock(), vec!["a", "b"]);

        let stats = batcher.stats();
        assert_eq!(stats.failed_flushes, 2);
        assert_eq!(stats.flushed, 2);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_keeps_submission_order() {
        let (store, _temp) = create_test_store();
        let sink = FlakySink::new(store, 1, outage);
        let batcher = batcher(sink.clone(), None, 5);

        batcher.submit(record("a")).unwrap();
        batcher.submit(record("b")).unwrap();
        // first attempt fails at 100ms, retry is due at 200ms
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(batcher.pending(), 2);
        batcher.submit(record("c")).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*sink.written.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drops_batch_after_failure_bound() {
        let (store, _temp) = create_test_store();
        let sink = FlakySink::new(store.clone(), usize::MAX, outage);
        let batcher = batcher(sink.clone(), None, 3);

        batcher.submit(record("a")).unwrap();
        batcher.submit(record("b")).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(batcher.pending(), 0);
        let stats = batcher.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.failed_flushes, 3);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_is_never_retried() {
        let (store, _temp) = create_test_store();
        let sink = FlakySink::new(store, 1, invalid);
        let batcher = batcher(sink.clone(), None, 5);

        batcher.submit(record("a")).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(batcher.stats().dropped, 1);
        assert!(sink.written.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_exceeded_reclaims_then_retries() {
        let (store, _temp) = create_test_store();
        let sink = FlakySink::new(store.clone(), 1, disk_full);
        let hook = Arc::new(CountingHook::default());
        let batcher = batcher(sink.clone(), Some(hook.clone()), 5);

        batcher.submit(record("a")).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(hook.quota_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(batcher.stats().dropped, 0);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_now_runs_hook() {
        let (store, _temp) = create_test_store();
        let hook = Arc::new(CountingHook::default());
        let batcher = batcher(Arc::new(store.clone()), Some(hook.clone()), 5);

        assert_eq!(batcher.flush_now().await, FlushOutcome::Empty);
        batcher.submit(record("a")).unwrap();
        batcher.submit(record("b")).unwrap();
        assert_eq!(batcher.flush_now().await, FlushOutcome::Flushed(2));

        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
        assert_eq!(hook.records.load(Ordering::SeqCst), 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects_new_records() {
        let (store, _temp) = create_test_store();
        let batcher = batcher(Arc::new(store.clone()), None, 5);

        batcher.submit(record("a")).unwrap();
        batcher.shutdown().await;

        assert_eq!(store.count().unwrap(), 1);
        assert!(matches!(
            batcher.submit(record("b")),
            Err(StoreError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_pending() {
        let (store, _temp) = create_test_store();
        let batcher = batcher(Arc::new(store), None, 5);

        batcher.submit(record("a")).unwrap();
        batcher.submit(record("b")).unwrap();
        assert_eq!(batcher.discard_pending(), 2);
        assert_eq!(batcher.pending(), 0);
        assert_eq!(batcher.stats().dropped, 2);
    }
}
