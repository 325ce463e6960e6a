use crate::error::TransportError;
use crate::transport::RecordTransport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Mock transport for testing the drainer
///
/// Responses are queued and consumed one per `deliver` call; with the queue
/// empty every delivery succeeds.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<Result<(), TransportError>>>>,
    delivered: Arc<Mutex<Vec<Vec<String>>>>,
    attempt_count: Arc<AtomicUsize>,
    deliver_delay: Arc<RwLock<Option<Duration>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose deliveries take `delay` to complete
    pub fn new_with_delay(delay: Duration) -> Self {
        Self {
            deliver_delay: Arc::new(RwLock::new(Some(delay))),
            ..Default::default()
        }
    }

    /// Queue an explicit response for the next delivery
    pub async fn mock_response(&self, response: Result<(), TransportError>) {
        self.responses.lock().await.push_back(response);
    }

    pub async fn mock_retriable_failure(&self, reason: &str) {
        self.mock_response(Err(TransportError::retriable(anyhow::anyhow!(
            reason.to_string()
        ))))
        .await;
    }

    pub async fn mock_fatal_failure(&self, reason: &str) {
        self.mock_response(Err(TransportError::fatal(anyhow::anyhow!(
            reason.to_string()
        ))))
        .await;
    }

    /// Batches the transport has confirmed, in delivery order
    pub async fn get_delivered_batches(&self) -> Vec<Vec<String>> {
        self.delivered.lock().await.clone()
    }

    /// Every confirmed record, flattened across batches
    pub async fn get_delivered_records(&self) -> Vec<String> {
        self.delivered.lock().await.iter().flatten().cloned().collect()
    }

    /// Number of `deliver` calls, confirmed or not
    pub fn get_attempt_count(&self) -> usize {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordTransport for MockTransport {
    async fn deliver(&self, records: &[String]) -> Result<(), TransportError> {
        self.attempt_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = *self.deliver_delay.read().await {
            tokio::time::sleep(delay).await;
        }

        match self.responses.lock().await.pop_front() {
            Some(Err(e)) => Err(e),
            Some(Ok(())) | None => {
                self.delivered.lock().await.push(records.to_vec());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_responses_are_consumed_in_order() {
        let transport = MockTransport::new();
        transport.mock_retriable_failure("throttled").await;

        let batch = vec!["a".to_string()];
        let err = transport.deliver(&batch).await.unwrap_err();
        assert!(err.is_retriable());

        transport.deliver(&batch).await.unwrap();
        assert_eq!(transport.get_attempt_count(), 2);
        assert_eq!(transport.get_delivered_records().await, vec!["a"]);
    }
}
