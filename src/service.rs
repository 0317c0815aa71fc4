//! Facade over the store, ingest pipeline, session tracker and quota monitor

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::filter::FilterPredicate;
use crate::ingest::{BatcherConfig, FlushHook, FlushOutcome, IngestBatcher, IngestStats};
use crate::observability::Metrics;
use crate::quota::{
    ConfiguredQuota, QuotaMonitor, QuotaProvider, Recommendation, StorageStatus, UnsupportedQuota,
    DEFAULT_WARNING_THRESHOLD,
};
use crate::record::{format_message, LogLevel, LogRecord};
use crate::session::{Session, SessionTracker};
use crate::store::{
    perform_cleanup, CleanupSummary, LogStore, QueryOptions, Result, RetentionPolicy,
    StorageUsage, StoreError,
};

#[derive(Builder)]
pub struct ServiceOptions {
    #[builder(default)]
    pub batcher: BatcherConfig,
    #[builder(default)]
    pub retention: RetentionPolicy,
    #[builder(default = true)]
    pub auto_cleanup: bool,
    #[builder(default = DEFAULT_WARNING_THRESHOLD)]
    pub warning_threshold: f64,
    /// `None` uses the store's size against `quota_total` when set, otherwise
    /// an unknown quota
    pub quota: Option<Arc<dyn QuotaProvider>>,
    pub quota_total: Option<u64>,
    #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)]
    pub clock: Arc<dyn Clock>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSummary {
    /// Records removed from the store
    pub deleted: u64,
    /// Buffered records discarded before reaching the store
    pub discarded: u64,
}

/// Checks quota after each flush and evicts when the monitor asks for it
struct RetentionHook {
    store: LogStore,
    monitor: QuotaMonitor,
    policy: RetentionPolicy,
    metrics: Arc<Metrics>,
}

impl RetentionHook {
    fn evict(&self) {
        let summary = perform_cleanup(&self.store, &self.policy);
        self.metrics.records_evicted(summary.total_deleted);
    }
}

#[async_trait]
impl FlushHook for RetentionHook {
    async fn after_flush(&self, _flushed: usize) {
        let status = match self.monitor.check_status(None).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Quota check after flush failed");
                return;
            }
        };
        if !status.needs_cleanup {
            return;
        }

        info!(
            level = ?status.warning_level,
            usage_percent = ?status.usage_percent,
            "Storage over threshold, running cleanup"
        );
        self.evict();
    }

    async fn on_quota_exceeded(&self) {
        info!("Store reported quota exhaustion, running cleanup");
        self.evict();
    }
}

/// Entry point for capture, query and maintenance operations
pub struct LogService {
    store: LogStore,
    batcher: IngestBatcher,
    sessions: Arc<SessionTracker>,
    monitor: QuotaMonitor,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
}

impl LogService {
    pub fn open<P: AsRef<Path>>(path: P, options: ServiceOptions) -> Result<Self> {
        let store = LogStore::open_with_clock(path, options.clock.clone())?;
        Ok(Self::with_store(store, options))
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let options = ServiceOptions::builder()
            .batcher(config.ingest.batcher_config())
            .retention(config.retention.policy())
            .auto_cleanup(config.retention.auto_cleanup)
            .warning_threshold(config.quota.warning_threshold)
            .maybe_quota_total(config.quota.total.map(u64::from))
            .build();
        Self::open(&config.server.data_path, options)
    }

    pub fn with_store(store: LogStore, options: ServiceOptions) -> Self {
        let metrics = Arc::new(Metrics::new());
        let provider: Arc<dyn QuotaProvider> = match (options.quota, options.quota_total) {
            (Some(provider), _) => provider,
            (None, Some(total)) => Arc::new(ConfiguredQuota::new(total, store.clone())),
            (None, None) => Arc::new(UnsupportedQuota),
        };
        let monitor = QuotaMonitor::new(provider, store.clone())
            .with_warning_threshold(options.warning_threshold);

        let hook: Option<Arc<dyn FlushHook>> =
            (options.auto_cleanup && !options.retention.is_empty()).then(|| {
                Arc::new(RetentionHook {
                    store: store.clone(),
                    monitor: monitor.clone(),
                    policy: options.retention,
                    metrics: metrics.clone(),
                }) as Arc<dyn FlushHook>
            });

        let batcher = IngestBatcher::new(
            Arc::new(store.clone()),
            hook,
            options.batcher,
            metrics.clone(),
        );

        Self {
            store,
            batcher,
            sessions: Arc::new(SessionTracker::new(options.clock.clone())),
            monitor,
            metrics,
            clock: options.clock,
        }
    }

    /// Capture one event. The record is buffered; the returned id becomes
    /// queryable after the next successful flush.
    pub fn submit(
        &self,
        level: &str,
        message: &str,
        args: &[Value],
        url: &str,
        context_id: &str,
    ) -> Result<String> {
        let level: LogLevel = level.parse()?;
        if message.is_empty() && args.is_empty() {
            return Err(StoreError::InvalidInput("message is required".to_string()));
        }
        if context_id.is_empty() {
            return Err(StoreError::InvalidInput("contextId is required".to_string()));
        }

        let id = Uuid::now_v7().to_string();
        let record = LogRecord::capture(
            id.clone(),
            self.clock.now_ms(),
            level,
            format_message(message, args),
            url,
            context_id,
        );
        // A NUL in any key field would fail the whole batch at flush time
        for (field, value) in [
            ("contextId", &record.context_id),
            ("domain", &record.domain),
            ("sessionId", &record.session_id),
        ] {
            if value.contains('\0') {
                return Err(StoreError::InvalidInput(format!(
                    "{} must not contain NUL bytes",
                    field
                )));
            }
        }

        let session_id = record.session_id.clone();
        self.batcher.submit(record)?;
        self.sessions.on_event(context_id, url, &session_id);
        Ok(id)
    }

    pub fn query(
        &self,
        filter: &FilterPredicate,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogRecord>> {
        self.store
            .query(&QueryOptions::from_predicate(filter, limit, offset))
    }

    pub fn count(&self, filter: &FilterPredicate) -> Result<u64> {
        self.store.count_matching(filter)
    }

    pub fn get(&self, id: &str) -> Result<LogRecord> {
        self.store.get(id)
    }

    pub fn usage(&self) -> Result<StorageUsage> {
        self.store.usage()
    }

    pub async fn status(&self, warning_threshold: Option<f64>) -> Result<StorageStatus> {
        self.monitor.check_status(warning_threshold).await
    }

    pub async fn recommendations(&self) -> Result<Vec<Recommendation>> {
        self.monitor.recommendations().await
    }

    /// Manual cleanup with an explicit policy
    pub fn cleanup(&self, policy: &RetentionPolicy) -> CleanupSummary {
        let summary = perform_cleanup(&self.store, policy);
        self.metrics.records_evicted(summary.total_deleted);
        summary
    }

    pub fn delete_records<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        let mut deleted = 0;
        for chunk in ids.chunks(crate::store::DELETE_CHUNK) {
            deleted += self.store.delete_batch(chunk)?;
        }
        Ok(deleted)
    }

    pub fn delete_by_domain(&self, domain: &str) -> Result<u64> {
        self.store.delete_by_domain(domain)
    }

    /// Remove all stored records and drop anything still buffered
    pub fn clear_all(&self) -> Result<ClearSummary> {
        let discarded = self.batcher.discard_pending() as u64;
        let deleted = self.store.clear()?;
        Ok(ClearSummary { deleted, discarded })
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.active_sessions()
    }

    pub fn context_closed(&self, context_id: &str) -> bool {
        self.sessions.on_context_closed(context_id)
    }

    pub fn context_navigated(&self, context_id: &str, url: &str) -> bool {
        self.sessions.on_context_navigated(context_id, url)
    }

    pub fn spawn_session_sweeper(
        &self,
        every: std::time::Duration,
        max_idle_ms: i64,
    ) -> JoinHandle<()> {
        Arc::clone(&self.sessions).spawn_sweeper(every, max_idle_ms)
    }

    pub async fn flush(&self) -> FlushOutcome {
        self.batcher.flush_now().await
    }

    /// Drain the ingest buffer and fsync the store
    pub async fn shutdown(&self) -> Result<()> {
        self.batcher.shutdown().await;
        self.store.persist()?;
        info!(stats = ?self.batcher.stats(), "Log service shut down");
        Ok(())
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.batcher.stats()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::quota::{Quota, StaticQuota, WarningLevel};
    use serde_json::json;
    use tempfile::TempDir;

    fn open_service(options: ServiceOptions) -> (LogService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = LogService::open(temp_dir.path().join("service"), options).unwrap();
        (service, temp_dir)
    }

    fn manual_options(clock: Arc<ManualClock>) -> ServiceOptions {
        ServiceOptions::builder().clock(clock).auto_cleanup(false).build()
    }

    #[tokio::test]
    async fn test_submit_then_flush_makes_record_queryable() {
        let clock = Arc::new(ManualClock::new(5_000));
        let (service, _temp) = open_service(manual_options(clock));

        let args = [json!({"code": 7}), json!("retry")];
        let id = service
            .submit("error", "failed", &args, "https://x.com/a", "tab1")
            .unwrap();
        assert!(matches!(service.get(&id), Err(StoreError::NotFound(_))));

        assert_eq!(service.flush().await, FlushOutcome::Flushed(1));
        let record = service.get(&id).unwrap();
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.message, r#"failed {"code":7} retry"#);
        assert_eq!(record.domain, "x.com");
        assert_eq!(record.timestamp, 5_000);
        assert_eq!(record.session_id, "x.com_tab1_0");

        let sessions = service.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, record.session_id);
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let (service, _temp) = open_service(ServiceOptions::default());

        for (level, message, context) in [
            ("", "m", "tab1"),
            ("fatal", "m", "tab1"),
            ("log", "", "tab1"),
            ("log", "m", ""),
        ] {
            let result = service.submit(level, message, &[], "https://x.com", context);
            assert!(
                matches!(result, Err(StoreError::InvalidInput(_))),
                "{level}/{message}/{context}"
            );
        }
        assert_eq!(service.ingest_stats().pending, 0);
    }

    #[tokio::test]
    async fn test_nul_context_is_rejected_without_losing_neighbours() {
        let clock = Arc::new(ManualClock::new(1_000));
        let (service, _temp) = open_service(manual_options(clock));

        let good = service.submit("log", "kept", &[], "https://x.com", "tab1").unwrap();
        let bad = service.submit("log", "poison", &[], "https://x.com", "a\0b");
        assert!(matches!(bad, Err(StoreError::InvalidInput(_))));
        assert_eq!(service.ingest_stats().pending, 1);
        assert!(service.sessions().iter().all(|s| s.context_id != "a\0b"));

        assert_eq!(service.flush().await, FlushOutcome::Flushed(1));
        assert_eq!(service.get(&good).unwrap().message, "kept");
        assert_eq!(service.store().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_submit_leaves_session_untouched() {
        let clock = Arc::new(ManualClock::new(1_000));
        let (service, _temp) = open_service(manual_options(clock.clone()));

        service.submit("log", "first", &[], "https://x.com", "tab1").unwrap();
        service.shutdown().await.unwrap();
        clock.advance(500);

        let result = service.submit("log", "late", &[], "https://x.com", "tab1");
        assert!(matches!(result, Err(StoreError::StoreUnavailable(_))));

        let session = &service.sessions()[0];
        assert_eq!(session.log_count, 1);
        assert_eq!(session.last_activity, 1_000);
    }

    #[tokio::test]
    async fn test_query_count_and_deletes() {
        let clock = Arc::new(ManualClock::new(1_000));
        let (service, _temp) = open_service(manual_options(clock.clone()));

        let a = service.submit("warn", "request timeout", &[], "https://x.com", "1").unwrap();
        clock.advance(10);
        let b = service.submit("error", "db timeout", &[], "https://y.com", "2").unwrap();
        clock.advance(10);
        service.submit("info", "ok", &[], "https://y.com", "2").unwrap();
        service.flush().await;

        let errors = FilterPredicate::new().with_level(LogLevel::Error).with_text("timeout");
        let found = service.query(&errors, 100, 0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b);
        assert_eq!(service.count(&FilterPredicate::new().with_text("timeout")).unwrap(), 2);

        assert_eq!(service.delete_records(&[a.as_str(), "missing"]).unwrap(), 1);
        assert_eq!(service.delete_by_domain("y.com").unwrap(), 2);
        assert_eq!(service.usage().unwrap().entry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_discards_buffer() {
        let (service, _temp) = open_service(ServiceOptions::default());
        service.submit("log", "stored", &[], "https://x.com", "1").unwrap();
        service.flush().await;
        service.submit("log", "buffered", &[], "https://x.com", "1").unwrap();

        let summary = service.clear_all().unwrap();
        assert_eq!(summary, ClearSummary { deleted: 1, discarded: 1 });
        assert_eq!(service.flush().await, FlushOutcome::Empty);
    }

    #[tokio::test]
    async fn test_flush_triggers_cleanup_when_quota_critical() {
        let clock = Arc::new(ManualClock::new(10_000));
        let quota = Quota {
            total: Some(100),
            used: Some(96),
        };
        let options = ServiceOptions::builder()
            .clock(clock.clone())
            .quota(Arc::new(StaticQuota(quota)))
            .retention(RetentionPolicy {
                max_entries: Some(2),
                ..Default::default()
            })
            .build();
        let (service, _temp) = open_service(options);

        for i in 0..4 {
            service.submit("log", &format!("m{i}"), &[], "https://x.com", "1").unwrap();
            clock.advance(1);
        }
        service.flush().await;

        assert_eq!(service.usage().unwrap().entry_count, 2);
        assert_eq!(service.metrics().snapshot().records_evicted, 2);

        let status = service.status(None).await.unwrap();
        assert_eq!(status.warning_level, WarningLevel::Critical);
        assert!(status.needs_cleanup);
    }

    #[tokio::test]
    async fn test_manual_cleanup_by_age() {
        let clock = Arc::new(ManualClock::new(100));
        let (service, _temp) = open_service(manual_options(clock.clone()));

        service.submit("log", "old", &[], "https://x.com", "1").unwrap();
        clock.set(200);
        service.submit("log", "mid", &[], "https://x.com", "1").unwrap();
        clock.set(300);
        service.submit("log", "new", &[], "https://x.com", "1").unwrap();
        service.flush().await;

        clock.set(1_000);
        let policy = RetentionPolicy {
            max_age_ms: Some(750),
            ..Default::default()
        };
        let summary = service.cleanup(&policy);
        assert_eq!(summary.deleted_by_age, 1);
        assert_eq!(summary.total_deleted, 1);
        assert_eq!(summary.final_usage.entry_count, 2);
    }

    #[tokio::test]
    async fn test_context_lifecycle() {
        let (service, _temp) = open_service(ServiceOptions::default());
        service.submit("log", "m", &[], "https://x.com", "tab1").unwrap();

        assert!(!service.context_navigated("tab1", "https://x.com/next"));
        assert!(service.context_navigated("tab1", "https://y.com"));
        assert!(service.sessions().is_empty());

        service.submit("log", "m", &[], "https://y.com", "tab1").unwrap();
        assert!(service.context_closed("tab1"));
        assert!(!service.context_closed("tab1"));
    }

    #[tokio::test]
    async fn test_shutdown_persists_pending() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("service");
        let id = {
            let service = LogService::open(&path, ServiceOptions::default()).unwrap();
            let id = service.submit("info", "bye", &[], "https://x.com", "1").unwrap();
            service.shutdown().await.unwrap();
            assert!(service.submit("info", "late", &[], "https://x.com", "1").is_err());
            id
        };
        // let the idle flush timer release its store handle
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let service = LogService::open(&path, ServiceOptions::default()).unwrap();
        assert_eq!(service.get(&id).unwrap().message, "bye");
    }
}
