/// Retention policy enforcement: age, then size, then count, oldest first
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::StoreError;
use super::store::LogStore;
use super::usage::StorageUsage;

/// Independently optional retention limits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionPolicy {
    pub max_age_ms: Option<i64>,
    pub max_size_bytes: Option<u64>,
    pub max_entries: Option<u64>,
}

impl RetentionPolicy {
    pub fn is_empty(&self) -> bool {
        self.max_age_ms.is_none() && self.max_size_bytes.is_none() && self.max_entries.is_none()
    }
}

/// Outcome of [`perform_cleanup`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub deleted_by_age: u64,
    pub deleted_by_size: u64,
    pub deleted_by_count: u64,
    pub total_deleted: u64,
    pub final_usage: StorageUsage,
    /// Messages of stages that failed part-way
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_errors: Vec<String>,
}

/// A stage that stopped early; `deleted` records were already removed
#[derive(Debug)]
pub struct StageFailure {
    pub deleted: u64,
    pub error: StoreError,
}

type StageResult = std::result::Result<u64, StageFailure>;

fn before_any_delete(error: StoreError) -> StageFailure {
    StageFailure { deleted: 0, error }
}

/// Delete records with `timestamp < now - max_age_ms`
pub fn cleanup_by_age(store: &LogStore, max_age_ms: i64) -> StageResult {
    let cutoff = store.now_ms().saturating_sub(max_age_ms.max(0));

    let mut expired = Vec::new();
    store
        .visit_oldest(|timestamp, id| {
            if timestamp >= cutoff {
                return Ok(false);
            }
            expired.push(id);
            Ok(true)
        })
        .map_err(before_any_delete)?;

    let deleted = delete_oldest_first(store, &expired)?;
    debug!(cutoff, deleted, "Age cleanup finished");
    Ok(deleted)
}

/// Delete oldest records until total size is within `max_size_bytes`
pub fn cleanup_by_size(store: &LogStore, max_size_bytes: u64) -> StageResult {
    let usage = store.usage().map_err(before_any_delete)?;
    if usage.total_size_bytes <= max_size_bytes {
        return Ok(0);
    }

    let excess = usage.total_size_bytes - max_size_bytes;
    let mut freed = 0u64;
    let mut victims = Vec::new();
    store
        .visit_oldest(|_, id| {
            if let Some(size) = store.record_size(&id)? {
                freed += size;
                victims.push(id);
            }
            Ok(freed < excess)
        })
        .map_err(before_any_delete)?;

    let deleted = delete_oldest_first(store, &victims)?;
    debug!(excess, freed, deleted, "Size cleanup finished");
    Ok(deleted)
}

/// Delete the oldest `count - max_entries` records
pub fn cleanup_by_count(store: &LogStore, max_entries: u64) -> StageResult {
    let count = store.count().map_err(before_any_delete)?;
    if count <= max_entries {
        return Ok(0);
    }

    let surplus = (count - max_entries) as usize;
    let mut victims = Vec::with_capacity(surplus);
    store
        .visit_oldest(|_, id| {
            victims.push(id);
            Ok(victims.len() < surplus)
        })
        .map_err(before_any_delete)?;

    let deleted = delete_oldest_first(store, &victims)?;
    debug!(count, max_entries, deleted, "Count cleanup finished");
    Ok(deleted)
}

/// Run every configured stage in fixed order. A failing stage is logged and
/// recorded in `stage_errors`; later stages still run. Deletions already
/// committed are always reported, so this never fails as a whole.
pub fn perform_cleanup(store: &LogStore, policy: &RetentionPolicy) -> CleanupSummary {
    run_stages(
        policy.max_age_ms.map(|max| move || cleanup_by_age(store, max)),
        policy.max_size_bytes.map(|max| move || cleanup_by_size(store, max)),
        policy.max_entries.map(|max| move || cleanup_by_count(store, max)),
        || store.usage(),
    )
}

fn run_stages<A, S, C, U>(
    by_age: Option<A>,
    by_size: Option<S>,
    by_count: Option<C>,
    final_usage: U,
) -> CleanupSummary
where
    A: FnOnce() -> StageResult,
    S: FnOnce() -> StageResult,
    C: FnOnce() -> StageResult,
    U: FnOnce() -> Result<StorageUsage, StoreError>,
{
    let mut summary = CleanupSummary::default();
    let errors = &mut summary.stage_errors;

    if let Some(stage) = by_age {
        summary.deleted_by_age = settle("age", stage(), errors);
    }
    if let Some(stage) = by_size {
        summary.deleted_by_size = settle("size", stage(), errors);
    }
    if let Some(stage) = by_count {
        summary.deleted_by_count = settle("count", stage(), errors);
    }

    summary.total_deleted =
        summary.deleted_by_age + summary.deleted_by_size + summary.deleted_by_count;
    match final_usage() {
        Ok(usage) => summary.final_usage = usage,
        Err(error) => {
            warn!(error = %error, "Usage scan after cleanup failed");
            summary
                .stage_errors
                .push(format!("final usage scan failed: {}", error));
        }
    }

    info!(
        deleted_by_age = summary.deleted_by_age,
        deleted_by_size = summary.deleted_by_size,
        deleted_by_count = summary.deleted_by_count,
        remaining = summary.final_usage.entry_count,
        failed_stages = summary.stage_errors.len(),
        "Cleanup complete"
    );
    summary
}

fn settle(stage: &str, result: StageResult, errors: &mut Vec<String>) -> u64 {
    match result {
        Ok(deleted) => deleted,
        Err(StageFailure { deleted, error }) => {
            warn!(stage, deleted, error = %error, "Cleanup stage failed");
            errors.push(format!("{} cleanup failed: {}", stage, error));
            deleted
        }
    }
}

/// Delete `ids` (already oldest first) in committed chunks so progress made
/// before a failure is kept and reported.
fn delete_oldest_first(store: &LogStore, ids: &[String]) -> StageResult {
    let mut deleted = 0;
    for chunk in ids.chunks(super::store::DELETE_CHUNK) {
        match store.delete_batch(chunk) {
            Ok(removed) => deleted += removed,
            Err(error) => return Err(StageFailure { deleted, error }),
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::record::{LogLevel, LogRecord};
    use crate::store::QueryOptions;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store(now: i64) -> (LogStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let store = LogStore::open_with_clock(temp_dir.path().join("retention"), clock).unwrap();
        (store, temp_dir)
    }

    fn record(id: &str, ts: i64) -> LogRecord {
        LogRecord::capture(id, ts, LogLevel::Log, "message", "https://x.com", "1")
    }

    fn remaining_ids(store: &LogStore) -> Vec<String> {
        store
            .query(&QueryOptions::builder().limit(usize::MAX).build())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    #[test]
    fn test_age_cutoff_is_strict() {
        let (store, _temp) = create_test_store(1_000);
        store
            .write_batch(&[record("a", 100), record("b", 200), record("c", 300)])
            .unwrap();

        // now=1000, max_age=750 -> cutoff=250
        assert_eq!(cleanup_by_age(&store, 750).unwrap(), 1);
        assert_eq!(remaining_ids(&store), vec!["b", "c"]);

        // cutoff=200 exactly: the record at 200 survives
        assert_eq!(cleanup_by_age(&store, 800).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_size_cleanup_removes_oldest_until_within_limit() {
        let (store, _temp) = create_test_store(1_000);
        let records: Vec<_> = (0..5).map(|i| record(&format!("r{i}"), 100 + i)).collect();
        store.write_batch(&records).unwrap();

        let per_record = records[0].approximate_size();
        let limit = per_record * 3;
        let deleted = cleanup_by_size(&store, limit).unwrap();

        assert_eq!(deleted, 2);
        assert!(store.usage().unwrap().total_size_bytes <= limit);
        assert_eq!(remaining_ids(&store), vec!["r2", "r3", "r4"]);
    }

    #[test]
    fn test_size_cleanup_noop_under_limit() {
        let (store, _temp) = create_test_store(1_000);
        store.write(&record("a", 1)).unwrap();
        assert_eq!(cleanup_by_size(&store, u64::MAX).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_count_cleanup_keeps_newest() {
        let (store, _temp) = create_test_store(1_000);
        let records: Vec<_> = (0..6).map(|i| record(&format!("r{i}"), 10 * (6 - i))).collect();
        store.write_batch(&records).unwrap();

        assert_eq!(cleanup_by_count(&store, 4).unwrap(), 2);
        // r5 (ts 10) and r4 (ts 20) were oldest
        assert_eq!(remaining_ids(&store), vec!["r3", "r2", "r1", "r0"]);
        assert_eq!(cleanup_by_count(&store, 4).unwrap(), 0);
    }

    #[test]
    fn test_perform_cleanup_applies_stages_in_order() {
        let (store, _temp) = create_test_store(10_000);
        let records: Vec<_> = (0..10).map(|i| record(&format!("r{i}"), 1_000 * i)).collect();
        store.write_batch(&records).unwrap();

        let policy = RetentionPolicy {
            // cutoff 3000: removes r0, r1, r2
            max_age_ms: Some(7_000),
            // room for 5 of the remaining 7, which all share one size
            max_size_bytes: Some(records[3].approximate_size() * 5),
            // then trim to 3
            max_entries: Some(3),
        };
        let summary = perform_cleanup(&store, &policy);

        assert_eq!(summary.deleted_by_age, 3);
        assert_eq!(summary.deleted_by_size, 2);
        assert_eq!(summary.deleted_by_count, 2);
        assert_eq!(summary.total_deleted, 7);
        assert_eq!(summary.final_usage.entry_count, 3);
        assert!(summary.stage_errors.is_empty());
        assert_eq!(remaining_ids(&store), vec!["r7", "r8", "r9"]);
    }

    #[test]
    fn test_empty_policy_deletes_nothing() {
        let (store, _temp) = create_test_store(1_000);
        store.write(&record("a", 1)).unwrap();

        let summary = perform_cleanup(&store, &RetentionPolicy::default());
        assert_eq!(summary.total_deleted, 0);
        assert_eq!(summary.final_usage.entry_count, 1);
    }

    fn commit_failure() -> StoreError {
        StoreError::TransactionFailed("commit rejected".to_string())
    }

    #[test]
    fn test_settle_keeps_partial_deletions() {
        let mut errors = Vec::new();
        let failure = StageFailure {
            deleted: 3,
            error: commit_failure(),
        };

        assert_eq!(settle("size", Err(failure), &mut errors), 3);
        assert_eq!(errors, vec!["size cleanup failed: Transaction failed: commit rejected"]);

        assert_eq!(settle("count", Ok(2), &mut errors), 2);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_failed_stage_does_not_block_later_stages() {
        let (store, _temp) = create_test_store(1_000);
        let records: Vec<_> = (0..6).map(|i| record(&format!("r{i}"), 100 + i)).collect();
        store.write_batch(&records).unwrap();

        // age stage removes one record, then its next chunk fails
        let summary = run_stages(
            Some(|| -> StageResult {
                store.delete("r0").unwrap();
                Err(StageFailure {
                    deleted: 1,
                    error: commit_failure(),
                })
            }),
            None::<fn() -> StageResult>,
            Some(|| cleanup_by_count(&store, 2)),
            || store.usage(),
        );

        assert_eq!(summary.deleted_by_age, 1);
        assert_eq!(summary.deleted_by_count, 3);
        assert_eq!(summary.total_deleted, 4);
        assert_eq!(summary.final_usage.entry_count, 2);
        assert_eq!(summary.stage_errors.len(), 1);
        assert!(summary.stage_errors[0].starts_with("age cleanup failed"));
        assert_eq!(remaining_ids(&store), vec!["r4", "r5"]);
    }

    #[test]
    fn test_failed_usage_scan_keeps_stage_counts() {
        let (store, _temp) = create_test_store(1_000);
        store.write_batch(&[record("a", 1), record("b", 2)]).unwrap();

        let summary = run_stages(
            None::<fn() -> StageResult>,
            None::<fn() -> StageResult>,
            Some(|| cleanup_by_count(&store, 1)),
            || Err(StoreError::StoreUnavailable("scan aborted".to_string())),
        );

        assert_eq!(summary.deleted_by_count, 1);
        assert_eq!(summary.total_deleted, 1);
        assert_eq!(summary.final_usage, StorageUsage::default());
        assert_eq!(summary.stage_errors.len(), 1);
        assert!(summary.stage_errors[0].contains("scan aborted"));
        assert_eq!(store.count().unwrap(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_cleanup_postconditions(
            timestamps in prop::collection::vec(0i64..10_000, 0..40),
            max_age in prop::option::of(0i64..12_000),
            max_entries in prop::option::of(0u64..30),
            size_slots in prop::option::of(0u64..30),
        ) {
            let now = 10_000;
            let (store, _temp) = create_test_store(now);
            let records: Vec<_> = timestamps
                .iter()
                .enumerate()
                .map(|(i, ts)| record(&format!("r{i:03}"), *ts))
                .collect();
            store.write_batch(&records).unwrap();

            let slot = record("r000", 0).approximate_size();
            let policy = RetentionPolicy {
                max_age_ms: max_age,
                max_size_bytes: size_slots.map(|n| n * slot),
                max_entries,
            };
            let summary = perform_cleanup(&store, &policy);

            prop_assert_eq!(
                summary.total_deleted,
                summary.deleted_by_age + summary.deleted_by_size + summary.deleted_by_count
            );
            prop_assert_eq!(summary.total_deleted, records.len() as u64 - store.count().unwrap());
            if let Some(max) = max_entries {
                prop_assert!(store.count().unwrap() <= max);
            }
            if let Some(max_age) = max_age {
                let cutoff = now - max_age;
                let all = QueryOptions::builder().limit(usize::MAX).build();
                let survivors = store.query(&all).unwrap();
                prop_assert!(survivors.iter().all(|r| r.timestamp >= cutoff));
            }
            if let Some(max) = policy.max_size_bytes {
                prop_assert!(summary.final_usage.total_size_bytes <= max);
            }
        }
    }
}
