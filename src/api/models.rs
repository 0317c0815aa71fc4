use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::error::ApiError;
use super::utils::split_list;
use crate::filter::FilterPredicate;
use crate::record::{LogLevel, LogRecord};
use crate::store::DEFAULT_QUERY_LIMIT;

/// Body of `POST /logs`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
    /// Extra console arguments, rendered after the message
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub context_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitResponse {
    pub id: String,
}

/// Query string shared by `GET /logs` and `GET /logs/count`
///
/// List parameters are comma separated, e.g. `levels=error,warn`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub levels: Option<String>,
    pub domains: Option<String>,
    pub session_ids: Option<String>,
    pub q: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListQuery {
    pub fn to_filter(&self) -> Result<FilterPredicate, ApiError> {
        let mut filter = FilterPredicate::new().between(self.start, self.end);

        if let Some(q) = &self.q {
            filter = filter.with_text(q.as_str());
        }
        for level in self.levels.as_deref().map(split_list).unwrap_or_default() {
            let level: LogLevel = level.parse()?;
            filter = filter.with_level(level);
        }
        for domain in self.domains.as_deref().map(split_list).unwrap_or_default() {
            filter = filter.with_domain(domain);
        }
        for session_id in self.session_ids.as_deref().map(split_list).unwrap_or_default() {
            filter = filter.with_session(session_id);
        }
        Ok(filter)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordsResponse {
    pub records: Vec<LogRecord>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Body of `POST /logs/delete`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeleteRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    pub threshold: Option<f64>,
}

/// Body of `POST /sessions/{context_id}/navigate`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NavigateRequest {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionChangeResponse {
    pub context_id: String,
    /// Whether a tracked session was removed
    pub ended: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
