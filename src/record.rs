//! Captured log records and the metadata derived for them at capture time.
//!
//! A [`LogRecord`] is immutable once built. Its serialized field names are the
//! contract with already-stored data, so they are pinned with serde renames.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::store::StoreError;

/// Domain recorded when a URL has no parsable host
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// Width of the wall-clock bucket folded into session ids (30 minutes)
pub const SESSION_BUCKET_MS: i64 = 30 * 60 * 1000;

const MAX_ARG_DEPTH: usize = 5;
const MAX_ARG_STRING_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Error,
    Warn,
    Info,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [LogLevel::Log, LogLevel::Error, LogLevel::Warn, LogLevel::Info];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
        }
    }
}

impl FromStr for LogLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(LogLevel::Log),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "" => Err(StoreError::InvalidInput("level is required".to_string())),
            other => Err(StoreError::InvalidInput(format!(
                "unrecognized level '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    pub url: String,
    pub domain: String,
    pub context_id: String,
    pub session_id: String,
}

impl LogRecord {
    /// Build a record, deriving `domain` and `session_id` from the url,
    /// context and timestamp.
    pub fn capture(
        id: impl Into<String>,
        timestamp: i64,
        level: LogLevel,
        message: impl Into<String>,
        url: impl Into<String>,
        context_id: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let context_id = context_id.into();
        let domain = domain_of(&url);
        let session_id = session_id_for(&domain, &context_id, timestamp);

        Self {
            id: id.into(),
            timestamp,
            level,
            message: message.into(),
            url,
            domain,
            context_id,
            session_id,
        }
    }

    /// Byte length of the record's JSON form.
    ///
    /// This is what the store persists per record, so usage reporting and
    /// size-based eviction agree on the same number.
    pub fn approximate_size(&self) -> u64 {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0)
    }
}

/// Host component of `url`, or [`UNKNOWN_DOMAIN`]. Never fails.
pub fn domain_of(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| UNKNOWN_DOMAIN.to_string())
}

/// Deterministic session id: `{domain}_{context_id}_{bucket}` where bucket
/// is the 30-minute window containing `timestamp_ms`.
pub fn session_id_for(domain: &str, context_id: &str, timestamp_ms: i64) -> String {
    let bucket = timestamp_ms.div_euclid(SESSION_BUCKET_MS);
    format!("{}_{}_{}", domain, context_id, bucket)
}

/// Render a console-style message followed by its arguments.
///
/// String arguments are appended as-is, everything else as compact JSON with
/// nesting past five levels collapsed to `"[Object]"` / `"[Array]"`.
pub fn format_message(message: &str, args: &[Value]) -> String {
    let mut out = truncate(message);
    for arg in args {
        if !out.is_empty() {
            out.push(' ');
        }
        match arg {
            Value::String(s) => out.push_str(&truncate(s)),
            other => {
                let limited = limit_depth(other, 0);
                out.push_str(&serde_json::to_string(&limited).unwrap_or_default());
            }
        }
    }
    out
}

fn limit_depth(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(_) if depth >= MAX_ARG_DEPTH => Value::String("[Object]".to_string()),
        Value::Array(_) if depth >= MAX_ARG_DEPTH => Value::String("[Array]".to_string()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), limit_depth(v, depth + 1)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| limit_depth(v, depth + 1)).collect())
        }
        Value::String(s) => Value::String(truncate(s)),
        scalar => scalar.clone(),
    }
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_ARG_STRING_CHARS) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}
