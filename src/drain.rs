//! The drain consumer: batch delivery of spooled records
//!
//! A [`SpoolDrainer`] owns the catch-up side of the spool. It polls the store
//! for unread records, hands them to the transport in order, and only after
//! the transport confirms a batch does it advance the read boundary and
//! compact. A crash or shutdown between delivery and removal re-delivers the
//! batch on the next run, which is the at-least-once contract: a record may
//! be sent twice, it is never silently lost while unremoved.

use crate::backoff::{Backoff, ExponentialBackoff};
use crate::error::{DrainError, TransportError};
use crate::monitoring::{DrainEvent, MonitoringConfig};
use crate::store::{RecordStore, RecordStoreExt};
use crate::transport::RecordTransport;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Configuration for the spool drainer
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrainerConfig {
    /// Maximum records handed to the transport per delivery
    pub batch_size: usize,
    /// How long to sleep when the spool is empty
    pub poll_interval: Duration,
    /// First delay after a retriable delivery failure
    pub initial_backoff: Duration,
    /// Ceiling for the failure backoff
    pub max_backoff: Duration,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            monitoring: MonitoringConfig::default(),
        }
    }
}

enum CycleOutcome {
    /// Nothing unread in the spool
    Idle,
    /// Batch confirmed and removed
    Delivered(usize),
    /// Transport failed the batch of `usize` records; they stay spooled
    Failed(TransportError, usize),
}

/// Background consumer that drains a [`RecordStore`] through a
/// [`RecordTransport`]
///
/// # Examples
///
/// ```rust
/// use record_spool::{
///     DrainerConfig, InMemoryRecordStore, RecordTransport, SpoolDrainer, TransportError,
/// };
///
/// struct NullTransport;
///
/// #[async_trait::async_trait]
/// impl RecordTransport for NullTransport {
///     async fn deliver(&self, _records: &[String]) -> Result<(), TransportError> {
///         Ok(())
///     }
/// }
///
/// async fn run_drainer(store: InMemoryRecordStore) -> Result<(), record_spool::DrainError> {
///     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
///     let (drainer, _monitoring_rx) =
///         SpoolDrainer::new(DrainerConfig::default(), NullTransport, store);
///
///     drainer.run(shutdown_rx).await
/// }
/// ```
pub struct SpoolDrainer<T, S>
where
    T: RecordTransport + 'static,
    S: RecordStore + 'static,
{
    config: DrainerConfig,
    transport: Arc<T>,
    store: Arc<S>,
    backoff: ExponentialBackoff,
    monitoring_tx: Option<mpsc::Sender<DrainEvent>>,
}

impl<T, S> SpoolDrainer<T, S>
where
    T: RecordTransport + 'static,
    S: RecordStore + 'static,
{
    /// Creates a drainer and, when monitoring is enabled, the receiving end
    /// of its event channel.
    pub fn new(
        config: DrainerConfig,
        transport: T,
        store: S,
    ) -> (Self, Option<mpsc::Receiver<DrainEvent>>) {
        let (monitoring_tx, monitoring_rx) = if config.monitoring.enabled {
            let (tx, rx) = mpsc::channel(config.monitoring.channel_size);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let backoff = ExponentialBackoff::new(config.initial_backoff, config.max_backoff);

        (
            Self {
                config,
                transport: Arc::new(transport),
                store: Arc::new(store),
                backoff,
                monitoring_tx,
            },
            monitoring_rx,
        )
    }

    /// The store this drainer consumes from
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn send_monitoring_event(&self, event: DrainEvent) {
        if let Some(tx) = &self.monitoring_tx {
            // Best effort: the drain loop never blocks on a slow consumer.
            if let Err(e) = tx.try_send(event) {
                trace!(error = %e, "Dropped monitoring event");
            }
        }
    }

    /// Run one drain cycle: read a batch, deliver it, remove on confirmation.
    async fn drain_cycle(&self) -> Result<CycleOutcome, DrainError> {
        let (records, upto) = {
            let mut iter = self.store.iter_unread();
            let mut records = Vec::new();
            while records.len() < self.config.batch_size && iter.has_next() {
                records.push(iter.next().map_err(DrainError::Store)?);
            }
            (records, iter.position())
        };

        if records.is_empty() {
            return Ok(CycleOutcome::Idle);
        }

        let count = records.len();
        let started = Instant::now();

        match self.transport.deliver(&records).await {
            Ok(()) => {
                // Removal only after confirmation; this ordering is what
                // makes delivery at-least-once across crashes.
                self.store.mark_read(upto)?;
                let removed = self.store.compact()?;

                let first = upto.get() - count as u64;
                debug!(
                    first_position = first,
                    count,
                    removed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Delivered and removed batch"
                );
                self.send_monitoring_event(DrainEvent::batch_delivered(
                    crate::store::Position::new(first),
                    count,
                    started.elapsed(),
                ));
                self.send_monitoring_event(DrainEvent::compacted(removed));

                Ok(CycleOutcome::Delivered(count))
            }
            Err(e) => Ok(CycleOutcome::Failed(e, count)),
        }
    }

    /// Drain a single batch immediately, bypassing the polling loop.
    ///
    /// Returns the number of records delivered and removed; a transport
    /// failure of either kind surfaces as [`DrainError::Transport`] with the
    /// batch left spooled.
    pub async fn drain_once(&self) -> Result<usize, DrainError> {
        match self.drain_cycle().await? {
            CycleOutcome::Idle => Ok(0),
            CycleOutcome::Delivered(count) => Ok(count),
            CycleOutcome::Failed(e, _) => Err(e.into()),
        }
    }

    /// Run the drain loop until the shutdown signal flips to `true`.
    ///
    /// Retriable transport failures back off exponentially and keep the loop
    /// alive; a fatal failure stops it with the undelivered records
    /// preserved in the spool.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DrainError> {
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting spool drainer"
        );

        let mut consecutive_failures = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                outcome = self.drain_cycle() => outcome?,
                _ = shutdown.changed() => continue,
            };

            match outcome {
                CycleOutcome::Delivered(count) => {
                    trace!(count, "Drain cycle delivered batch");
                    consecutive_failures = 0;
                }
                CycleOutcome::Idle => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                CycleOutcome::Failed(e, count) => {
                    let fatal = !e.is_retriable();
                    consecutive_failures += 1;
                    self.send_monitoring_event(DrainEvent::delivery_failed(
                        count,
                        consecutive_failures,
                        e.to_string(),
                        fatal,
                    ));

                    if fatal {
                        error!(
                            error = %e,
                            count,
                            "Fatal delivery failure, stopping drainer with records preserved"
                        );
                        return Err(e.into());
                    }

                    let delay = self.backoff.delay_for(consecutive_failures - 1);
                    warn!(
                        error = %e,
                        count,
                        consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Delivery failed, records stay spooled, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Spool drainer shutdown complete");
        Ok(())
    }
}
