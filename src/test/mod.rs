//! Test utilities and mock implementations for exercising the spool

pub mod mocks;

use crate::store::{Position, RecordStore};
use std::time::Duration;

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// Create `count` distinct record payloads
    pub fn create_test_records(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("record-{}", i)).collect()
    }

    /// Append `count` generated records, returning their positions
    pub fn fill_store(store: &impl RecordStore, count: usize) -> Vec<Position> {
        Self::create_test_records(count)
            .iter()
            .map(|record| store.put(record).expect("test append failed"))
            .collect()
    }
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_for_condition<F>(mut check: F, timeout: Duration) -> anyhow::Result<()>
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while !check() {
        if start.elapsed() > timeout {
            anyhow::bail!("Condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;

    #[test]
    fn test_create_test_records() {
        let records = TestUtils::create_test_records(3);
        assert_eq!(records, vec!["record-0", "record-1", "record-2"]);
    }

    #[test]
    fn test_fill_store() {
        let store = InMemoryRecordStore::new();
        let positions = TestUtils::fill_store(&store, 4);
        assert_eq!(store.len(), 4);
        assert_eq!(positions.first(), Some(&Position::ZERO));
        assert_eq!(positions.last(), Some(&Position::new(3)));
    }
}
