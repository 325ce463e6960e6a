//! Error types for the record spool

use thiserror::Error;

/// Errors raised by record store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to append record: {0}")]
    AppendFailed(String),

    #[error("record of {size} bytes exceeds the per-record limit of {limit} bytes")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("append of {needed} bytes would exceed the storage limit of {limit} bytes")]
    CapacityExceeded { needed: u64, limit: u64 },

    #[error("iterator exhausted: no unread records remain")]
    Exhausted,

    #[error("record log corrupted at byte offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            offset,
            reason: reason.into(),
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned by the delivery transport
///
/// A retriable failure leaves the batch in the spool for a later drain
/// cycle; a fatal failure stops the drainer with the records preserved.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("retriable delivery failure: {0}")]
    Retriable(#[source] anyhow::Error),

    #[error("fatal delivery failure: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl TransportError {
    pub fn retriable(err: impl Into<anyhow::Error>) -> Self {
        TransportError::Retriable(err.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        TransportError::Fatal(err.into())
    }

    /// Whether the drainer may attempt this batch again
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransportError::Retriable(_))
    }
}

/// Main error type for drainer operations
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("store error during drain: {0}")]
    Store(#[from] StoreError),

    #[error("transport rejected the batch: {0}")]
    Transport(String),

    #[error("shutdown requested")]
    Shutdown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<TransportError> for DrainError {
    fn from(err: TransportError) -> Self {
        DrainError::Transport(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DrainError {
    fn from(err: tokio::task::JoinError) -> Self {
        DrainError::Other(err.into())
    }
}
