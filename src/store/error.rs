use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record id: {0}")]
    DuplicateKey(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Transient failures the ingestion batcher may retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::StoreUnavailable(_) | StoreError::TransactionFailed(_)
        )
    }
}

impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        match err {
            fjall::Error::Io(io) => io.into(),
            other => StoreError::TransactionFailed(other.to_string()),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull => StoreError::QuotaExceeded,
            _ => StoreError::StoreUnavailable(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
