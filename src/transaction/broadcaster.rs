//! Broadcaster with failover across the channel's ordering nodes.

use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;

use crate::error::{ClientError, ClientResult};
use crate::observability::metrics;
use crate::protos::common::{Envelope, Status};
use crate::resilience::with_timeout;
use crate::transport::OrdererNode;

/// Submission acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    pub tx_id: String,
    /// `common.Status` reported by the ordering node.
    pub status: i32,
    pub info: String,
    /// Node that answered.
    pub orderer: String,
}

impl SubmitResult {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success as i32
    }

    pub fn status_name(&self) -> String {
        Status::try_from(self.status)
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|_| self.status.to_string())
    }
}

/// Connectivity of one ordering node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrdererHealth {
    pub orderer: String,
    pub connected: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    timeout: Duration,
}

impl Broadcaster {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Submit to each node in order until one answers.
    pub async fn broadcast(
        &self,
        channel: &str,
        orderers: &[OrdererNode],
        envelope: &Envelope,
        tx_id: &str,
    ) -> ClientResult<SubmitResult> {
        for (i, node) in orderers.iter().enumerate() {
            match with_timeout(self.timeout, node.orderer.broadcast(envelope)).await {
                Ok(response) => {
                    let result = SubmitResult {
                        tx_id: tx_id.to_string(),
                        status: response.status,
                        info: response.info,
                        orderer: node.name.clone(),
                    };
                    metrics::record_broadcast(
                        &node.name,
                        if result.is_success() { "accepted" } else { "rejected" },
                    );
                    tracing::info!(
                        orderer = %node.name,
                        tx_id = %tx_id,
                        status = %result.status_name(),
                        "Transaction submitted"
                    );
                    return Ok(result);
                }
                Err(e) => {
                    metrics::record_broadcast(&node.name, "unavailable");
                    tracing::warn!(
                        orderer_idx = i,
                        orderer = %node.name,
                        error = %e,
                        "Broadcast failed, trying next orderer"
                    );
                }
            }
        }

        Err(ClientError::OrdererUnavailable {
            channel: channel.to_string(),
            attempted: orderers.len(),
        })
    }

    /// Check every node concurrently; one entry per node, in input order.
    pub async fn check_connections(&self, orderers: &[OrdererNode]) -> Vec<OrdererHealth> {
        let checks = orderers.iter().map(|node| async move {
            let result = with_timeout(self.timeout, node.orderer.check_connection()).await;
            if let Err(e) = &result {
                tracing::warn!(orderer = %node.name, error = %e, "Orderer unreachable");
            }
            OrdererHealth {
                orderer: node.name.clone(),
                connected: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            }
        });
        join_all(checks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protos::orderer::BroadcastResponse;
    use crate::transport::Orderer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeOrderer {
        status: Option<Status>,
        calls: AtomicUsize,
    }

    impl FakeOrderer {
        fn new(status: Option<Status>) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Orderer for FakeOrderer {
        async fn broadcast(&self, _envelope: &Envelope) -> Result<BroadcastResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.status {
                Some(status) => Ok(BroadcastResponse {
                    status: status as i32,
                    info: String::new(),
                }),
                None => Err(TransportError::Unavailable("connection refused".into())),
            }
        }

        async fn check_connection(&self) -> Result<(), TransportError> {
            match self.status {
                Some(_) => Ok(()),
                None => Err(TransportError::Unavailable("connection refused".into())),
            }
        }
    }

    fn node(name: &str, orderer: Arc<FakeOrderer>) -> OrdererNode {
        OrdererNode {
            name: name.to_string(),
            orderer,
        }
    }

    fn envelope() -> Envelope {
        Envelope {
            payload: b"payload".to_vec(),
            signature: b"sig".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_application_status_is_data() {
        let first = FakeOrderer::new(Some(Status::BadRequest));
        let second = FakeOrderer::new(Some(Status::Success));
        let orderers = vec![node("o0", first.clone()), node("o1", second.clone())];

        let result = Broadcaster::new(Duration::from_secs(1))
            .broadcast("ch", &orderers, &envelope(), "tx1")
            .await
            .unwrap();
        assert_eq!(result.status, Status::BadRequest as i32);
        assert_eq!(result.status_name(), "BadRequest");
        assert!(!result.is_success());
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_unreachable() {
        let orderers = vec![node("o0", FakeOrderer::new(None)), node("o1", FakeOrderer::new(None))];
        let result = Broadcaster::new(Duration::from_secs(1))
            .broadcast("ch", &orderers, &envelope(), "tx1")
            .await;
        assert!(matches!(
            result,
            Err(ClientError::OrdererUnavailable { attempted: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_no_orderers_configured() {
        let result = Broadcaster::new(Duration::from_secs(1))
            .broadcast("ch", &[], &envelope(), "tx1")
            .await;
        assert!(matches!(
            result,
            Err(ClientError::OrdererUnavailable { attempted: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_check_connections_reports_each_node() {
        let up = FakeOrderer::new(Some(Status::Success));
        let down = FakeOrderer::new(None);
        let orderers = vec![node("o0", down), node("o1", up.clone())];

        let health = Broadcaster::new(Duration::from_secs(1))
            .check_connections(&orderers)
            .await;
        assert_eq!(health.len(), 2);
        assert_eq!((health[0].orderer.as_str(), health[0].connected), ("o0", false));
        assert!(health[0].error.as_deref().unwrap().contains("connection refused"));
        assert_eq!((health[1].orderer.as_str(), health[1].connected), ("o1", true));
        assert_eq!(health[1].error, None);
        // Probing submits nothing.
        assert_eq!(up.calls.load(Ordering::SeqCst), 0);
    }
}
