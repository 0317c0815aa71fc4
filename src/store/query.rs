/// Query options and time-range normalization for store scans
use bon::Builder;
use std::collections::BTreeSet;

use crate::filter::{DateRange, FilterPredicate};
use crate::record::LogLevel;

pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Options for [`LogStore::query`](super::LogStore::query).
///
/// Lists are OR-ed internally and AND-ed with each other; an empty list does
/// not restrict. Bounds are inclusive and normalized before scanning.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct QueryOptions {
    #[builder(default)]
    pub levels: BTreeSet<LogLevel>,
    #[builder(default)]
    pub domains: BTreeSet<String>,
    #[builder(default)]
    pub session_ids: BTreeSet<String>,
    #[builder(default, into)]
    pub text_search: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    #[builder(default = DEFAULT_QUERY_LIMIT)]
    pub limit: usize,
    #[builder(default)]
    pub offset: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl QueryOptions {
    /// Translate a predicate into scan options.
    ///
    /// An open end on the predicate stays open rather than collapsing to
    /// "now", so future-dated records remain visible.
    pub fn from_predicate(filter: &FilterPredicate, limit: usize, offset: usize) -> Self {
        Self {
            levels: filter.levels.clone(),
            domains: filter.domains.clone(),
            session_ids: filter.session_ids.clone(),
            text_search: filter.text_search.clone(),
            start_time: filter.date_range.start,
            end_time: Some(filter.date_range.end.unwrap_or(i64::MAX)),
            limit,
            offset,
        }
    }

    /// Predicate applied to each record inside the scanned range
    pub(crate) fn in_scan_predicate(&self) -> FilterPredicate {
        FilterPredicate {
            text_search: self.text_search.clone(),
            levels: self.levels.clone(),
            domains: self.domains.clone(),
            session_ids: self.session_ids.clone(),
            date_range: DateRange::default(),
        }
    }
}

/// Clamp a requested range into a non-empty inclusive `[start, end]`.
///
/// - negative or missing start becomes 0
/// - missing or negative end becomes `now_ms`
/// - an inverted range is swapped and its upper bound widened by 1ms
pub fn normalize_range(start: Option<i64>, end: Option<i64>, now_ms: i64) -> (i64, i64) {
    let start = start.unwrap_or(0).max(0);
    let end = match end {
        Some(end) if end >= 0 => end,
        _ => now_ms.max(0),
    };

    if end < start {
        (end, start.saturating_add(1))
    } else {
        (start, end)
    }
}
