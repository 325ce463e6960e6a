//! Monitoring events emitted by the drainer
//!
//! When enabled, the drainer publishes a [`DrainEvent`] per notable action on
//! an mpsc channel handed back from `SpoolDrainer::new`. Consumers that fall
//! behind lose events (the send is best-effort); the drain loop never blocks
//! on monitoring.

use crate::store::Position;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the monitoring channel
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
        }
    }
}

/// A timestamped monitoring event from the drainer
#[derive(Debug, Clone)]
pub struct DrainEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: DrainEventType,
}

/// The kinds of events the drainer reports
#[derive(Debug, Clone)]
pub enum DrainEventType {
    /// A batch was confirmed by the transport
    BatchDelivered {
        /// Position of the first record in the batch
        first: Position,
        count: usize,
        duration: Duration,
    },
    /// The transport failed the batch; records stay spooled
    DeliveryFailed {
        count: usize,
        consecutive_failures: u32,
        error: String,
        fatal: bool,
    },
    /// Delivered records were removed from storage
    Compacted { removed: u64 },
}

impl DrainEvent {
    pub fn batch_delivered(first: Position, count: usize, duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: DrainEventType::BatchDelivered {
                first,
                count,
                duration,
            },
        }
    }

    pub fn delivery_failed(
        count: usize,
        consecutive_failures: u32,
        error: String,
        fatal: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: DrainEventType::DeliveryFailed {
                count,
                consecutive_failures,
                error,
                fatal,
            },
        }
    }

    pub fn compacted(removed: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: DrainEventType::Compacted { removed },
        }
    }
}
