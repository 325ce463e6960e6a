//! Record Spool - a durable local buffer for outbound records
//!
//! This crate provides a crash-safe way to buffer serialized records on
//! local storage until a background drainer delivers them: producers
//! `put` opaque string payloads into a [`RecordStore`], a [`SpoolDrainer`]
//! reads them in arrival order through a cursor, hands batches to a
//! [`RecordTransport`], and removes records only after delivery is
//! confirmed. Unremoved records survive process restarts, giving
//! at-least-once delivery end to end.

pub mod backoff;
pub mod drain;
pub mod error;
pub mod monitoring;
pub mod store;
pub mod transport;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;
mod tests;

pub use backoff::{Backoff, ConstantBackoff, ExponentialBackoff};
pub use drain::{DrainerConfig, SpoolDrainer};
pub use error::{DrainError, Result, StoreError, TransportError};

// Re-export main traits
pub use crate::store::{Position, RecordIterator, RecordStore, RecordStoreExt};
pub use crate::transport::RecordTransport;

// Re-export implementations
pub use crate::store::file::{CapacityPolicy, FileRecordStore, FileStoreConfig, FsyncMode};
pub use crate::store::memory::InMemoryRecordStore;
