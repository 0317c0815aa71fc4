use crate::humanize::ByteSize;
use crate::ingest::BatcherConfig;
use crate::store::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory of the fjall keyspace
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Largest accepted request body, after decompression
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            data_path: default_data_path(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/logkeep")
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize::mib(1)
}

/// Ingestion batcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: default_flush_delay_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl IngestConfig {
    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig::builder()
            .flush_delay(Duration::from_millis(self.flush_delay_ms))
            .max_consecutive_failures(self.max_consecutive_failures)
            .build()
    }
}

fn default_flush_delay_ms() -> u64 {
    100
}

fn default_max_consecutive_failures() -> u32 {
    5
}

/// Retention limits applied by automatic and manual cleanup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: Option<u32>,
    #[serde(default = "default_max_size")]
    pub max_size: Option<ByteSize>,
    #[serde(default = "default_max_entries")]
    pub max_entries: Option<u64>,
    /// Run cleanup after a flush when the quota monitor asks for it
    #[serde(default = "default_auto_cleanup")]
    pub auto_cleanup: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            max_size: default_max_size(),
            max_entries: default_max_entries(),
            auto_cleanup: default_auto_cleanup(),
        }
    }
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age_ms: self.max_age_days.map(|days| i64::from(days) * DAY_MS),
            max_size_bytes: self.max_size.map(u64::from),
            max_entries: self.max_entries,
        }
    }
}

fn default_max_age_days() -> Option<u32> {
    Some(7)
}

fn default_max_size() -> Option<ByteSize> {
    Some(ByteSize::mib(100))
}

fn default_max_entries() -> Option<u64> {
    Some(100_000)
}

fn default_auto_cleanup() -> bool {
    true
}

/// Storage quota. Without `total` the quota is unknown.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaConfig {
    pub total: Option<ByteSize>,
    /// Percent of quota at which status turns to warning
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            total: None,
            warning_threshold: default_warning_threshold(),
        }
    }
}

fn default_warning_threshold() -> f64 {
    crate::quota::DEFAULT_WARNING_THRESHOLD
}

/// Session tracker housekeeping
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: default_max_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SessionsConfig {
    pub fn max_idle_ms(&self) -> i64 {
        i64::try_from(self.max_idle_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_max_idle_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
