//! Buffered ingestion: records are queued in memory and written in batches

mod batcher;
mod sink;

pub use batcher::{BatcherConfig, FlushOutcome, IngestBatcher, IngestStats};
pub use sink::{FlushHook, RecordSink};
