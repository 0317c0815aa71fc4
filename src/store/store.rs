use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::filter::FilterPredicate;
use crate::record::LogRecord;

use super::error::{Result, StoreError};
use super::partitions::{
    decode_tag_key, decode_tagged_time_key, decode_time_key, encode_tag_key, encode_tag_prefix,
    encode_tagged_time_key, encode_time_key, is_valid_tag, tagged_time_lower_bound,
    tagged_time_upper_bound, time_lower_bound, time_upper_bound, IDX_DOMAIN, IDX_DOMAIN_TIME,
    IDX_LEVEL, IDX_LEVEL_TIME, IDX_SESSION, IDX_TIMESTAMP, RECORDS,
};
use super::query::{normalize_range, QueryOptions};
use super::usage::StorageUsage;

/// Number of records removed per committed batch by bulk deletes
pub const DELETE_CHUNK: usize = 256;

/// Fjall-backed log record store with six secondary indices
///
/// Every write and delete touches the record and all of its index entries in
/// one atomic batch, so the indices never disagree with `records`.
#[derive(Clone)]
pub struct LogStore {
    keyspace: Keyspace,
    records: PartitionHandle,
    by_timestamp: PartitionHandle,
    by_domain: PartitionHandle,
    by_level: PartitionHandle,
    by_session: PartitionHandle,
    by_domain_time: PartitionHandle,
    by_level_time: PartitionHandle,
    clock: Arc<dyn Clock>,
}

enum ScanPlan<'a> {
    Timeline,
    Domain(&'a str),
    Level(&'a str),
}

impl<'a> ScanPlan<'a> {
    /// Narrow scans to a composite index when exactly one domain or level is
    /// requested. Every plan yields (timestamp, id) order.
    fn choose(opts: &'a QueryOptions) -> Self {
        if opts.domains.len() == 1 {
            if let Some(domain) = opts.domains.iter().next() {
                return ScanPlan::Domain(domain);
            }
        }
        if opts.levels.len() == 1 {
            if let Some(level) = opts.levels.iter().next() {
                return ScanPlan::Level(level.as_str());
            }
        }
        ScanPlan::Timeline
    }
}

impl LogStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open with an explicit clock, used to resolve open-ended query ranges
    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening log store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let open = |name: &str| keyspace.open_partition(name, PartitionCreateOptions::default());

        let records = open(RECORDS)?;
        let by_timestamp = open(IDX_TIMESTAMP)?;
        let by_domain = open(IDX_DOMAIN)?;
        let by_level = open(IDX_LEVEL)?;
        let by_session = open(IDX_SESSION)?;
        let by_domain_time = open(IDX_DOMAIN_TIME)?;
        let by_level_time = open(IDX_LEVEL_TIME)?;

        info!("Log store opened successfully");
        Ok(Self {
            keyspace,
            records,
            by_timestamp,
            by_domain,
            by_level,
            by_session,
            by_domain_time,
            by_level_time,
            clock,
        })
    }

    /// Insert a single record
    pub fn write(&self, record: &LogRecord) -> Result<()> {
        self.write_batch(std::slice::from_ref(record)).map(|_| ())
    }

    /// Insert records atomically. Any id collision, with stored data or
    /// inside the batch, rejects the whole batch with `DuplicateKey`.
    pub fn write_batch(&self, records: &[LogRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            validate_record(record)?;
            if !seen.insert(record.id.as_str())
                || self.records.contains_key(record.id.as_bytes())?
            {
                return Err(StoreError::DuplicateKey(record.id.clone()));
            }
        }

        let mut batch = self.keyspace.batch();
        for record in records {
            let value = serde_json::to_vec(record)?;
            batch.insert(&self.records, record.id.clone().into_bytes(), value);
            self.index(&mut batch, record);
        }
        batch.commit()?;

        debug!(count = records.len(), "Wrote record batch");
        Ok(records.len())
    }

    /// Get a record by id
    pub fn get(&self, id: &str) -> Result<LogRecord> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Get a record by id, `None` if absent
    pub fn find(&self, id: &str) -> Result<Option<LogRecord>> {
        match self.records.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Filtered, paginated scan in ascending timestamp order
    pub fn query(&self, opts: &QueryOptions) -> Result<Vec<LogRecord>> {
        if opts.limit == 0 {
            return Ok(Vec::new());
        }

        let mut skipped = 0;
        let mut page = Vec::with_capacity(opts.limit.min(1024));
        self.scan(opts, &mut |record: LogRecord| {
            if skipped < opts.offset {
                skipped += 1;
                return true;
            }
            page.push(record);
            page.len() < opts.limit
        })?;

        debug!(returned = page.len(), offset = opts.offset, "Query completed");
        Ok(page)
    }

    /// Count records matching a predicate
    pub fn count_matching(&self, filter: &FilterPredicate) -> Result<u64> {
        if filter.is_match_all() {
            return self.count();
        }

        let opts = QueryOptions::from_predicate(filter, usize::MAX, 0);
        let mut count = 0u64;
        self.scan(&opts, &mut |_: LogRecord| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// Delete one record; absent ids are a no-op
    pub fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.delete_batch(&[id])? > 0)
    }

    /// Delete records atomically, skipping absent ids. Returns removed count.
    pub fn delete_batch<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        let mut batch = self.keyspace.batch();
        let mut seen = HashSet::with_capacity(ids.len());
        let mut removed = 0u64;

        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                continue;
            }
            let Some(record) = self.find(id)? else {
                continue;
            };
            batch.remove(&self.records, id.as_bytes().to_vec());
            self.unindex(&mut batch, &record);
            removed += 1;
        }

        if removed > 0 {
            batch.commit()?;
            debug!(removed, "Deleted record batch");
        }
        Ok(removed)
    }

    /// Delete every record of a domain via the domain index
    pub fn delete_by_domain(&self, domain: &str) -> Result<u64> {
        let ids = self.ids_with_tag(&self.by_domain, domain)?;
        let removed = self.delete_in_chunks(&ids)?;
        info!(domain, removed, "Deleted records for domain");
        Ok(removed)
    }

    /// All records captured under a session id, oldest first
    pub fn records_for_session(&self, session_id: &str) -> Result<Vec<LogRecord>> {
        let mut records = Vec::new();
        for id in self.ids_with_tag(&self.by_session, session_id)? {
            if let Some(record) = self.find(&id)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Total number of stored records
    pub fn count(&self) -> Result<u64> {
        Ok(self.records.len()? as u64)
    }

    /// Remove every record. Returns removed count.
    pub fn clear(&self) -> Result<u64> {
        let mut ids = Vec::new();
        for item in self.records.iter() {
            let (key, _) = item?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        let removed = self.delete_in_chunks(&ids)?;
        info!(removed, "Cleared log store");
        Ok(removed)
    }

    /// Full-scan usage aggregate
    pub fn usage(&self) -> Result<StorageUsage> {
        let mut usage = StorageUsage::default();
        for item in self.records.iter() {
            let (_, value) = item?;
            let record: LogRecord = serde_json::from_slice(&value)?;
            usage.add(&record.domain, value.len() as u64);
        }
        Ok(usage)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Health check - verify the keyspace is readable
    pub fn health_check(&self) -> Result<()> {
        let _ = self.records.contains_key(b"__health__")?;
        Ok(())
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Visit (timestamp, id) pairs oldest first until `visit` returns false
    pub(crate) fn visit_oldest(
        &self,
        mut visit: impl FnMut(i64, String) -> Result<bool>,
    ) -> Result<()> {
        for item in self.by_timestamp.iter() {
            let (key, _) = item?;
            let Some((timestamp, id)) = decode_time_key(&key) else {
                continue;
            };
            if !visit(timestamp, id)? {
                break;
            }
        }
        Ok(())
    }

    /// Stored size of a record in bytes, `None` if absent
    pub(crate) fn record_size(&self, id: &str) -> Result<Option<u64>> {
        Ok(self.records.get(id.as_bytes())?.map(|value| value.len() as u64))
    }

    pub(crate) fn delete_in_chunks(&self, ids: &[String]) -> Result<u64> {
        let mut removed = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            removed += self.delete_batch(chunk)?;
        }
        Ok(removed)
    }

    fn scan(&self, opts: &QueryOptions, visit: &mut dyn FnMut(LogRecord) -> bool) -> Result<()> {
        let (start, end) = normalize_range(opts.start_time, opts.end_time, self.clock.now_ms());
        let predicate = opts.in_scan_predicate();

        match ScanPlan::choose(opts) {
            ScanPlan::Domain(domain) => self.scan_entries(
                self.by_domain_time.range(
                    tagged_time_lower_bound(domain, start)..tagged_time_upper_bound(domain, end),
                ),
                |key| decode_tagged_time_key(key).map(|(_, _, id)| id),
                &predicate,
                visit,
            ),
            ScanPlan::Level(level) => self.scan_entries(
                self.by_level_time.range(
                    tagged_time_lower_bound(level, start)..tagged_time_upper_bound(level, end),
                ),
                |key| decode_tagged_time_key(key).map(|(_, _, id)| id),
                &predicate,
                visit,
            ),
            ScanPlan::Timeline => self.scan_entries(
                self.by_timestamp
                    .range(time_lower_bound(start)..time_upper_bound(end)),
                |key| decode_time_key(key).map(|(_, id)| id),
                &predicate,
                visit,
            ),
        }
    }

    fn scan_entries<I, K, V>(
        &self,
        entries: I,
        decode: fn(&[u8]) -> Option<String>,
        predicate: &FilterPredicate,
        visit: &mut dyn FnMut(LogRecord) -> bool,
    ) -> Result<()>
    where
        I: Iterator<Item = std::result::Result<(K, V), fjall::Error>>,
        K: AsRef<[u8]>,
    {
        for item in entries {
            let (key, _) = item?;
            let Some(id) = decode(key.as_ref()) else {
                continue;
            };
            // Index entry may outlive a concurrent delete of its record
            let Some(record) = self.find(&id)? else {
                continue;
            };
            if predicate.matches(&record) && !visit(record) {
                break;
            }
        }
        Ok(())
    }

    fn ids_with_tag(&self, index: &PartitionHandle, tag: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for item in index.prefix(encode_tag_prefix(tag)) {
            let (key, _) = item?;
            if let Some((_, id)) = decode_tag_key(&key) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn index(&self, batch: &mut Batch, record: &LogRecord) {
        let (id, ts, level) = (record.id.as_str(), record.timestamp, record.level.as_str());
        batch.insert(&self.by_timestamp, encode_time_key(ts, id), Vec::new());
        batch.insert(&self.by_domain, encode_tag_key(&record.domain, id), Vec::new());
        batch.insert(&self.by_level, encode_tag_key(level, id), Vec::new());
        batch.insert(&self.by_session, encode_tag_key(&record.session_id, id), Vec::new());
        batch.insert(
            &self.by_domain_time,
            encode_tagged_time_key(&record.domain, ts, id),
            Vec::new(),
        );
        batch.insert(&self.by_level_time, encode_tagged_time_key(level, ts, id), Vec::new());
    }

    fn unindex(&self, batch: &mut Batch, record: &LogRecord) {
        let (id, ts, level) = (record.id.as_str(), record.timestamp, record.level.as_str());
        batch.remove(&self.by_timestamp, encode_time_key(ts, id));
        batch.remove(&self.by_domain, encode_tag_key(&record.domain, id));
        batch.remove(&self.by_level, encode_tag_key(level, id));
        batch.remove(&self.by_session, encode_tag_key(&record.session_id, id));
        batch.remove(&self.by_domain_time, encode_tagged_time_key(&record.domain, ts, id));
        batch.remove(&self.by_level_time, encode_tagged_time_key(level, ts, id));
    }
}

fn validate_record(record: &LogRecord) -> Result<()> {
    if record.id.is_empty() {
        return Err(StoreError::InvalidInput("record id is required".to_string()));
    }
    if record.timestamp < 0 {
        return Err(StoreError::InvalidInput(format!(
            "record {} has negative timestamp {}",
            record.id, record.timestamp
        )));
    }
    for (field, value) in [
        ("id", &record.id),
        ("domain", &record.domain),
        ("sessionId", &record.session_id),
    ] {
        if !is_valid_tag(value) {
            return Err(StoreError::InvalidInput(format!(
                "{} contains a NUL byte",
                field
            )));
        }
    }
    Ok(())
}
