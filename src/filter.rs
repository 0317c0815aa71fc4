//! Pure record predicate used by queries, counts and exports.
//!
//! Every clause is independent and an empty clause matches everything, so a
//! default [`FilterPredicate`] matches all records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::record::{LogLevel, LogRecord};

/// Inclusive timestamp window; a `None` bound is open on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DateRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl DateRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.is_none_or(|start| timestamp >= start)
            && self.end.is_none_or(|end| timestamp <= end)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterPredicate {
    pub text_search: String,
    pub levels: BTreeSet<LogLevel>,
    pub domains: BTreeSet<String>,
    pub session_ids: BTreeSet<String>,
    pub date_range: DateRange,
}

impl FilterPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_search = text.into();
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.levels.insert(level);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domains.insert(domain.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_ids.insert(session_id.into());
        self
    }

    pub fn between(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.date_range = DateRange::new(start, end);
        self
    }

    /// True when no clause restricts anything
    pub fn is_match_all(&self) -> bool {
        self.text_search.is_empty()
            && self.levels.is_empty()
            && self.domains.is_empty()
            && self.session_ids.is_empty()
            && self.date_range.is_unbounded()
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        self.level_matches(record)
            && self.text_matches(record)
            && self.date_matches(record)
            && self.domain_matches(record)
            && self.session_matches(record)
    }

    pub fn level_matches(&self, record: &LogRecord) -> bool {
        self.levels.is_empty() || self.levels.contains(&record.level)
    }

    /// Case-insensitive substring match. An empty message never satisfies a
    /// non-empty search.
    pub fn text_matches(&self, record: &LogRecord) -> bool {
        if self.text_search.is_empty() {
            return true;
        }
        if record.message.is_empty() {
            return false;
        }
        record
            .message
            .to_lowercase()
            .contains(&self.text_search.to_lowercase())
    }

    pub fn date_matches(&self, record: &LogRecord) -> bool {
        self.date_range.contains(record.timestamp)
    }

    pub fn domain_matches(&self, record: &LogRecord) -> bool {
        self.domains.is_empty() || self.domains.contains(&record.domain)
    }

    pub fn session_matches(&self, record: &LogRecord) -> bool {
        self.session_ids.is_empty() || self.session_ids.contains(&record.session_id)
    }
}
