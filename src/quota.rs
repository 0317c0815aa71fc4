//! Storage quota sources and the monitor that classifies usage against them

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{LogStore, Result, StorageUsage};

pub const DEFAULT_WARNING_THRESHOLD: f64 = 80.0;
pub const CRITICAL_THRESHOLD: f64 = 95.0;

const RECOMMEND_QUOTA_PERCENT: f64 = 70.0;
const RECOMMEND_USAGE_BYTES: u64 = 50 * 1024 * 1024;
const RECOMMEND_ENTRY_COUNT: u64 = 10_000;
const RECOMMEND_DOMAIN_ENTRIES: u64 = 1_000;

/// Quota as reported by the environment. `None` means unknown, never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub total: Option<u64>,
    pub used: Option<u64>,
}

impl Quota {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn usage_percent(&self) -> Option<f64> {
        match (self.total, self.used) {
            (Some(total), Some(used)) if total > 0 => Some(used as f64 * 100.0 / total as f64),
            _ => None,
        }
    }
}

#[async_trait]
pub trait QuotaProvider: Send + Sync {
    async fn quota(&self) -> Result<Quota>;
}

/// Environment without a quota API
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedQuota;

#[async_trait]
impl QuotaProvider for UnsupportedQuota {
    async fn quota(&self) -> Result<Quota> {
        Ok(Quota::unknown())
    }
}

/// Fixed total from configuration; used is the store's logical size
#[derive(Clone)]
pub struct ConfiguredQuota {
    total: u64,
    store: LogStore,
}

impl ConfiguredQuota {
    pub fn new(total: u64, store: LogStore) -> Self {
        Self { total, store }
    }
}

#[async_trait]
impl QuotaProvider for ConfiguredQuota {
    async fn quota(&self) -> Result<Quota> {
        let used = self.store.usage()?.total_size_bytes;
        Ok(Quota {
            total: Some(self.total),
            used: Some(used),
        })
    }
}

/// Fixed values, for demos and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticQuota(pub Quota);

#[async_trait]
impl QuotaProvider for StaticQuota {
    async fn quota(&self) -> Result<Quota> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Normal,
    Warning,
    Critical,
}

/// Classify a usage percentage. Unknown usage is `Normal`.
pub fn classify(usage_percent: Option<f64>, warning_threshold: f64) -> WarningLevel {
    match usage_percent {
        Some(p) if p >= CRITICAL_THRESHOLD => WarningLevel::Critical,
        Some(p) if p >= warning_threshold => WarningLevel::Warning,
        _ => WarningLevel::Normal,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    pub needs_cleanup: bool,
    pub warning_level: WarningLevel,
    pub usage: StorageUsage,
    pub quota: Quota,
    pub usage_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    QuotaPressure,
    LargeStore,
    ManyEntries,
    NoisyDomain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
}

/// Reads the quota provider and the store; advisory only, never deletes
#[derive(Clone)]
pub struct QuotaMonitor {
    provider: Arc<dyn QuotaProvider>,
    store: LogStore,
    warning_threshold: f64,
}

impl QuotaMonitor {
    pub fn new(provider: Arc<dyn QuotaProvider>, store: LogStore) -> Self {
        Self {
            provider,
            store,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }

    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }

    pub fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    /// Provider failures degrade to an unknown quota
    pub async fn get_quota(&self) -> Quota {
        match self.provider.quota().await {
            Ok(quota) => quota,
            Err(e) => {
                warn!(error = %e, "Quota provider failed, treating quota as unknown");
                Quota::unknown()
            }
        }
    }

    pub async fn check_status(&self, warning_threshold: Option<f64>) -> Result<StorageStatus> {
        let threshold = warning_threshold.unwrap_or(self.warning_threshold);
        let quota = self.get_quota().await;
        let usage = self.store.usage()?;
        let usage_percent = quota.usage_percent();
        let warning_level = classify(usage_percent, threshold);

        Ok(StorageStatus {
            needs_cleanup: warning_level != WarningLevel::Normal,
            warning_level,
            usage,
            quota,
            usage_percent,
        })
    }

    pub async fn recommendations(&self) -> Result<Vec<Recommendation>> {
        let quota = self.get_quota().await;
        let usage = self.store.usage()?;
        Ok(recommend(&quota, &usage))
    }
}

fn recommend(quota: &Quota, usage: &StorageUsage) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if let Some(percent) = quota.usage_percent().filter(|p| *p > RECOMMEND_QUOTA_PERCENT) {
        out.push(Recommendation {
            kind: RecommendationKind::QuotaPressure,
            message: format!("Storage quota is {:.1}% used; consider a cleanup", percent),
        });
    }
    if usage.total_size_bytes > RECOMMEND_USAGE_BYTES {
        out.push(Recommendation {
            kind: RecommendationKind::LargeStore,
            message: format!(
                "Stored logs use {}; consider a shorter retention age",
                crate::humanize::ByteSize(usage.total_size_bytes)
            ),
        });
    }
    if usage.entry_count > RECOMMEND_ENTRY_COUNT {
        out.push(Recommendation {
            kind: RecommendationKind::ManyEntries,
            message: format!("{} entries stored; consider lowering max entries", usage.entry_count),
        });
    }
    for (domain, domain_usage) in usage.busiest_domains() {
        if domain_usage.count <= RECOMMEND_DOMAIN_ENTRIES {
            break;
        }
        out.push(Recommendation {
            kind: RecommendationKind::NoisyDomain,
            message: format!("{} has {} entries; consider clearing it", domain, domain_usage.count),
        });
    }
    out
}
