//! The delivery seam between the spool and the outside world
//!
//! The spool never performs network I/O itself; the drainer hands batches of
//! records to a [`RecordTransport`] and trusts its verdict. Whatever retry,
//! signing, or connection management the destination needs lives behind this
//! trait.

use crate::error::TransportError;
use async_trait::async_trait;

/// Trait for delivering drained record batches
///
/// # Examples
///
/// ```rust
/// use record_spool::{RecordTransport, TransportError};
///
/// struct StdoutTransport;
///
/// #[async_trait::async_trait]
/// impl RecordTransport for StdoutTransport {
///     async fn deliver(&self, records: &[String]) -> Result<(), TransportError> {
///         for record in records {
///             println!("{record}");
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RecordTransport: Send + Sync {
    /// Deliver a batch of records, in spool order.
    ///
    /// `Ok(())` confirms every record in the batch was accepted; only then
    /// will the drainer remove them. Return
    /// [`TransportError::Retriable`] to leave the batch spooled for a later
    /// cycle, [`TransportError::Fatal`] to stop the drainer with the batch
    /// preserved.
    async fn deliver(&self, records: &[String]) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: RecordTransport + ?Sized> RecordTransport for std::sync::Arc<T> {
    async fn deliver(&self, records: &[String]) -> Result<(), TransportError> {
        (**self).deliver(records).await
    }
}
