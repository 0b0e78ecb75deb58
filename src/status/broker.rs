//! Transaction Status Broker.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{ClientError, ClientResult};
use crate::observability::metrics;
use crate::protos::peer::TxValidationCode;

/// Commit outcome of one transaction as seen on the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxStatus {
    pub tx_id: String,
    pub validation_code: i32,
    pub block_number: u64,
}

impl TxStatus {
    pub fn is_valid(&self) -> bool {
        self.validation_code == TxValidationCode::Valid as i32
    }

    pub fn validation_name(&self) -> String {
        TxValidationCode::try_from(self.validation_code)
            .map(|code| format!("{:?}", code))
            .unwrap_or_else(|_| self.validation_code.to_string())
    }
}

/// Thread-safe registry of pending waits keyed by transaction id.
#[derive(Debug, Clone, Default)]
pub struct StatusBroker {
    waiters: Arc<DashMap<String, mpsc::Sender<TxStatus>>>,
}

impl StatusBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the single waiter for `tx_id`.
    pub fn register(&self, tx_id: &str) -> ClientResult<TxWaiter> {
        let rx = match self.waiters.entry(tx_id.to_string()) {
            Entry::Occupied(_) => return Err(ClientError::DuplicateWait(tx_id.to_string())),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(1);
                slot.insert(tx);
                rx
            }
        };
        metrics::record_pending_waiters(self.waiters.len());
        tracing::debug!(tx_id = %tx_id, "Waiter registered");

        Ok(TxWaiter {
            tx_id: tx_id.to_string(),
            rx,
            broker: self.clone(),
        })
    }

    /// Deliver `status` to its waiter. Returns `false` when nobody was waiting
    /// or the waiter already holds a status.
    pub fn publish(&self, status: TxStatus) -> bool {
        // Clone the sender so the shard lock is released before sending.
        let sender = self.waiters.get(&status.tx_id).map(|entry| entry.value().clone());
        match sender {
            Some(sender) => sender.try_send(status).is_ok(),
            None => false,
        }
    }

    /// Remove and close the waiter for `tx_id`.
    pub fn unregister(&self, tx_id: &str) -> bool {
        let removed = self.waiters.remove(tx_id).is_some();
        if removed {
            metrics::record_pending_waiters(self.waiters.len());
        }
        removed
    }

    pub fn is_registered(&self, tx_id: &str) -> bool {
        self.waiters.contains_key(tx_id)
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}

/// Live wait for one transaction; unregisters itself when dropped.
#[derive(Debug)]
pub struct TxWaiter {
    tx_id: String,
    rx: mpsc::Receiver<TxStatus>,
    broker: StatusBroker,
}

impl TxWaiter {
    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    /// Wait up to `limit` for the commit status.
    pub async fn wait(&mut self, limit: Duration) -> ClientResult<TxStatus> {
        match tokio::time::timeout(limit, self.rx.recv()).await {
            Ok(Some(status)) => Ok(status),
            Ok(None) => Err(ClientError::StreamTransport(format!(
                "waiter for {} was closed",
                self.tx_id
            ))),
            Err(_) => Err(ClientError::Timeout(limit.as_millis() as u64)),
        }
    }
}

impl Drop for TxWaiter {
    fn drop(&mut self) {
        self.broker.unregister(&self.tx_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(tx_id: &str, code: TxValidationCode) -> TxStatus {
        TxStatus {
            tx_id: tx_id.to_string(),
            validation_code: code as i32,
            block_number: 7,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_waiter() {
        let broker = StatusBroker::new();
        let mut waiter = broker.register("tx1").unwrap();

        assert!(broker.publish(status("tx1", TxValidationCode::Valid)));
        let received = waiter.wait(Duration::from_secs(1)).await.unwrap();
        assert!(received.is_valid());
        assert_eq!(received.block_number, 7);
    }

    #[test]
    fn test_publish_without_waiter_is_noop() {
        let broker = StatusBroker::new();
        assert!(!broker.publish(status("nobody", TxValidationCode::Valid)));
        assert_eq!(broker.pending(), 0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let broker = StatusBroker::new();
        let _waiter = broker.register("tx1").unwrap();
        assert!(matches!(broker.register("tx1"), Err(ClientError::DuplicateWait(_))));
    }

    #[test]
    fn test_drop_unregisters() {
        let broker = StatusBroker::new();
        let waiter = broker.register("tx1").unwrap();
        assert!(broker.is_registered("tx1"));
        drop(waiter);
        assert!(!broker.is_registered("tx1"));
        assert!(broker.register("tx1").is_ok());
    }

    #[test]
    fn test_duplicate_delivery_is_dropped() {
        let broker = StatusBroker::new();
        let _waiter = broker.register("tx1").unwrap();
        assert!(broker.publish(status("tx1", TxValidationCode::Valid)));
        assert!(!broker.publish(status("tx1", TxValidationCode::Valid)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let broker = StatusBroker::new();
        let mut waiter = broker.register("tx1").unwrap();
        let result = waiter.wait(Duration::from_secs(30)).await;
        assert!(matches!(result, Err(ClientError::Timeout(30_000))));
        drop(waiter);
        assert_eq!(broker.pending(), 0);
    }

    #[test]
    fn test_invalid_status_name() {
        let rejected = status("tx1", TxValidationCode::MvccReadConflict);
        assert!(!rejected.is_valid());
        assert_eq!(rejected.validation_name(), "MvccReadConflict");
    }
}
