//! Drainer behavior against mock transports

use crate::drain::{DrainerConfig, SpoolDrainer};
use crate::error::DrainError;
use crate::monitoring::{DrainEventType, MonitoringConfig};
use crate::store::{InMemoryRecordStore, RecordStore};
use crate::test::mocks::MockTransport;
use crate::test::{wait_for_condition, TestUtils};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn fast_config() -> DrainerConfig {
    DrainerConfig {
        batch_size: 100,
        poll_interval: Duration::from_millis(10),
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(50),
        monitoring: MonitoringConfig::default(),
    }
}

#[tokio::test]
async fn drain_once_delivers_and_removes() {
    let store = InMemoryRecordStore::new();
    TestUtils::fill_store(&store, 5);

    let transport = MockTransport::new();
    let (drainer, _) = SpoolDrainer::new(fast_config(), transport.clone(), store);

    assert_eq!(drainer.drain_once().await.unwrap(), 5);
    assert!(drainer.store().is_empty());
    assert_eq!(
        transport.get_delivered_records().await,
        TestUtils::create_test_records(5)
    );

    // Nothing left: the next cycle is a no-op.
    assert_eq!(drainer.drain_once().await.unwrap(), 0);
    assert_eq!(transport.get_attempt_count(), 1);
}

#[tokio::test]
async fn batch_size_bounds_each_delivery() {
    let store = InMemoryRecordStore::new();
    TestUtils::fill_store(&store, 5);

    let transport = MockTransport::new();
    let config = DrainerConfig {
        batch_size: 2,
        ..fast_config()
    };
    let (drainer, _) = SpoolDrainer::new(config, transport.clone(), store);

    assert_eq!(drainer.drain_once().await.unwrap(), 2);
    assert_eq!(drainer.store().len(), 3);

    let batches = transport.get_delivered_batches().await;
    assert_eq!(
        batches,
        vec![vec!["record-0".to_string(), "record-1".to_string()]]
    );
}

#[tokio::test]
async fn failed_delivery_leaves_records_spooled() {
    let store = InMemoryRecordStore::new();
    TestUtils::fill_store(&store, 3);

    let transport = MockTransport::new();
    transport.mock_retriable_failure("throttled").await;

    let (drainer, _) = SpoolDrainer::new(fast_config(), transport.clone(), store);

    let err = drainer.drain_once().await.unwrap_err();
    assert!(matches!(err, DrainError::Transport(_)));
    assert_eq!(drainer.store().len(), 3);

    // The retry delivers the same records: at-least-once, not at-most-once.
    assert_eq!(drainer.drain_once().await.unwrap(), 3);
    assert_eq!(
        transport.get_delivered_records().await,
        TestUtils::create_test_records(3)
    );
}

#[tokio::test]
async fn run_loop_drains_then_shuts_down() -> anyhow::Result<()> {
    let store = InMemoryRecordStore::new();
    TestUtils::fill_store(&store, 10);

    let transport = MockTransport::new();
    let (drainer, _) = SpoolDrainer::new(fast_config(), transport.clone(), store);
    let store = drainer.store().clone();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { drainer.run(shutdown_rx).await });

    wait_for_condition(|| store.is_empty(), Duration::from_secs(5)).await?;

    shutdown_tx.send(true)?;
    handle.await??;

    assert_eq!(
        transport.get_delivered_records().await,
        TestUtils::create_test_records(10)
    );
    Ok(())
}

#[tokio::test]
async fn run_loop_retries_after_retriable_failure() -> anyhow::Result<()> {
    let store = InMemoryRecordStore::new();
    TestUtils::fill_store(&store, 2);

    let transport = MockTransport::new();
    transport.mock_retriable_failure("throttled").await;
    transport.mock_retriable_failure("still throttled").await;

    let (drainer, _) = SpoolDrainer::new(fast_config(), transport.clone(), store);
    let store = drainer.store().clone();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { drainer.run(shutdown_rx).await });

    wait_for_condition(|| store.is_empty(), Duration::from_secs(5)).await?;

    shutdown_tx.send(true)?;
    handle.await??;

    // Two failed attempts plus the delivery that finally succeeded.
    assert_eq!(transport.get_attempt_count(), 3);
    assert_eq!(
        transport.get_delivered_records().await,
        TestUtils::create_test_records(2)
    );
    Ok(())
}

#[tokio::test]
async fn fatal_failure_stops_the_loop_with_records_preserved() -> anyhow::Result<()> {
    let store = InMemoryRecordStore::new();
    TestUtils::fill_store(&store, 4);

    let transport = MockTransport::new();
    transport.mock_fatal_failure("destination gone").await;

    let (drainer, _) = SpoolDrainer::new(fast_config(), transport.clone(), store);
    let store = drainer.store().clone();

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let result = drainer.run(shutdown_rx).await;

    assert!(matches!(result, Err(DrainError::Transport(_))));
    assert_eq!(store.len(), 4);
    assert!(transport.get_delivered_records().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn monitoring_reports_delivery_and_compaction() {
    let store = InMemoryRecordStore::new();
    TestUtils::fill_store(&store, 3);

    let transport = MockTransport::new();
    let config = DrainerConfig {
        monitoring: MonitoringConfig {
            enabled: true,
            channel_size: 16,
        },
        ..fast_config()
    };
    let (drainer, monitoring_rx) = SpoolDrainer::new(config, transport, store);
    let mut monitoring_rx = monitoring_rx.expect("monitoring enabled");

    drainer.drain_once().await.unwrap();

    let event = monitoring_rx.recv().await.unwrap();
    match event.event_type {
        DrainEventType::BatchDelivered { count, .. } => assert_eq!(count, 3),
        other => panic!("expected BatchDelivered, got {:?}", other),
    }

    let event = monitoring_rx.recv().await.unwrap();
    match event.event_type {
        DrainEventType::Compacted { removed } => assert_eq!(removed, 3),
        other => panic!("expected Compacted, got {:?}", other),
    }
}
