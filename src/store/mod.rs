/// Log record store: persistence, indexed queries, and retention
mod error;
mod partitions;
mod query;
pub mod retention;
mod store;
mod usage;

pub use error::{Result, StoreError};
pub use query::{normalize_range, QueryOptions, DEFAULT_QUERY_LIMIT};
pub use retention::{perform_cleanup, CleanupSummary, RetentionPolicy};
pub use store::{LogStore, DELETE_CHUNK};
pub use usage::{DomainUsage, StorageUsage};
