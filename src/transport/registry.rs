//! Connection registry: network handles keyed by channel and name.
//!
//! Mutated only while building; shared read-only (behind `Arc`) afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::transport::grpc::{endpoint, lazy_channel, GrpcDeliver, GrpcEndorser, GrpcOrderer};
use crate::transport::{DeliverSource, Endorser, Orderer};

/// Endorsing peer handle.
#[derive(Clone)]
pub struct Peer {
    pub name: String,
    /// Organization, used as the group label.
    pub org: String,
    /// Joined channels; empty means every channel.
    pub channels: Vec<String>,
    pub endorser: Arc<dyn Endorser>,
}

impl Peer {
    pub fn serves(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c == channel)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("name", &self.name)
            .field("org", &self.org)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Ordering node handle.
#[derive(Clone)]
pub struct OrdererNode {
    pub name: String,
    pub orderer: Arc<dyn Orderer>,
}

impl fmt::Debug for OrdererNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrdererNode").field("name", &self.name).finish()
    }
}

/// Event source handle.
#[derive(Clone)]
pub struct EventPeer {
    pub name: String,
    pub source: Arc<dyn DeliverSource>,
}

impl fmt::Debug for EventPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPeer").field("name", &self.name).finish()
    }
}

/// Holds every network handle of one client.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: Vec<Peer>,
    /// channel → name → node. `BTreeMap` gives the stable broadcast order.
    orderers: HashMap<String, BTreeMap<String, OrdererNode>>,
    event_peers: HashMap<String, Vec<EventPeer>>,
}

impl ConnectionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build gRPC handles for every configured endpoint.
    ///
    /// Channels connect lazily; this performs no network I/O.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let connect = Duration::from_secs(config.timeouts.connect_secs);
        let mut builder = Self::builder();

        for peer in &config.peers {
            let channel = lazy_channel(&peer.url, peer.tls.as_ref(), connect)?;
            builder = builder.peer(
                &peer.name,
                &peer.org,
                peer.channels.clone(),
                Arc::new(GrpcEndorser::new(channel)),
            );
        }

        for orderer in &config.orderers {
            let endpoint = endpoint(&orderer.url, orderer.tls.as_ref(), connect)?;
            builder = builder.orderer(
                &orderer.channel,
                &orderer.name,
                Arc::new(GrpcOrderer::new(endpoint)),
            );
        }

        for event_peer in &config.event_peers {
            let channel = lazy_channel(&event_peer.url, event_peer.tls.as_ref(), connect)?;
            builder = builder.event_peer(
                &event_peer.channel,
                &event_peer.name,
                Arc::new(GrpcDeliver::new(channel)),
            );
        }

        let registry = builder.build();
        tracing::info!(
            peers = registry.peers.len(),
            orderer_channels = registry.orderers.len(),
            event_channels = registry.event_peers.len(),
            "Connection registry initialized"
        );
        Ok(registry)
    }

    /// Every peer that has joined `channel`.
    pub fn peers_for_channel(&self, channel: &str) -> Vec<Peer> {
        self.peers.iter().filter(|p| p.serves(channel)).cloned().collect()
    }

    /// Peers of `channel` grouped by organization.
    pub fn peers_by_org(&self, channel: &str) -> BTreeMap<String, Vec<Peer>> {
        let mut groups: BTreeMap<String, Vec<Peer>> = BTreeMap::new();
        for peer in self.peers.iter().filter(|p| p.serves(channel)) {
            groups.entry(peer.org.clone()).or_default().push(peer.clone());
        }
        groups
    }

    pub fn peer(&self, name: &str) -> Option<Peer> {
        self.peers.iter().find(|p| p.name == name).cloned()
    }

    /// Ordering nodes of `channel` in stable (name) order.
    pub fn orderers(&self, channel: &str) -> Vec<OrdererNode> {
        self.orderers
            .get(channel)
            .map(|nodes| nodes.values().cloned().collect())
            .unwrap_or_default()
    }

    /// First configured event source of `channel`.
    pub fn event_peer(&self, channel: &str) -> Option<EventPeer> {
        self.event_peers
            .get(channel)
            .and_then(|peers| peers.first().cloned())
    }

    pub fn event_peer_named(&self, channel: &str, name: &str) -> Option<EventPeer> {
        self.event_peers
            .get(channel)
            .and_then(|peers| peers.iter().find(|p| p.name == name).cloned())
    }
}

/// Single-threaded construction of a [`ConnectionRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    registry: ConnectionRegistry,
}

impl RegistryBuilder {
    pub fn peer(
        mut self,
        name: &str,
        org: &str,
        channels: Vec<String>,
        endorser: Arc<dyn Endorser>,
    ) -> Self {
        self.registry.peers.retain(|p| p.name != name);
        self.registry.peers.push(Peer {
            name: name.to_string(),
            org: org.to_string(),
            channels,
            endorser,
        });
        self
    }

    pub fn orderer(mut self, channel: &str, name: &str, orderer: Arc<dyn Orderer>) -> Self {
        self.registry
            .orderers
            .entry(channel.to_string())
            .or_default()
            .insert(
                name.to_string(),
                OrdererNode {
                    name: name.to_string(),
                    orderer,
                },
            );
        self
    }

    pub fn event_peer(mut self, channel: &str, name: &str, source: Arc<dyn DeliverSource>) -> Self {
        let peers = self.registry.event_peers.entry(channel.to_string()).or_default();
        peers.retain(|p| p.name != name);
        peers.push(EventPeer {
            name: name.to_string(),
            source,
        });
        self
    }

    pub fn build(self) -> ConnectionRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protos::common::Envelope;
    use crate::protos::orderer::BroadcastResponse;
    use crate::protos::peer::{ProposalResponse, SignedProposal};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Endorser for Unreachable {
        async fn process_proposal(
            &self,
            _proposal: &SignedProposal,
        ) -> Result<ProposalResponse, TransportError> {
            Err(TransportError::Unavailable("test".into()))
        }
    }

    #[async_trait]
    impl Orderer for Unreachable {
        async fn broadcast(&self, _envelope: &Envelope) -> Result<BroadcastResponse, TransportError> {
            Err(TransportError::Unavailable("test".into()))
        }

        async fn check_connection(&self) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("test".into()))
        }
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::builder()
            .peer("peer0.org1", "Org1", vec!["ch1".into()], Arc::new(Unreachable))
            .peer("peer1.org1", "Org1", vec![], Arc::new(Unreachable))
            .peer("peer0.org2", "Org2", vec!["ch2".into()], Arc::new(Unreachable))
            .orderer("ch1", "orderer2", Arc::new(Unreachable))
            .orderer("ch1", "orderer0", Arc::new(Unreachable))
            .orderer("ch1", "orderer1", Arc::new(Unreachable))
            .build()
    }

    #[test]
    fn test_peers_filtered_by_channel() {
        let registry = registry();
        let names: Vec<_> = registry
            .peers_for_channel("ch1")
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["peer0.org1", "peer1.org1"]);

        let groups = registry.peers_by_org("ch2");
        assert_eq!(groups["Org1"].len(), 1);
        assert_eq!(groups["Org2"][0].name, "peer0.org2");
    }

    #[test]
    fn test_orderers_in_stable_order() {
        let registry = registry();
        let names: Vec<_> = registry.orderers("ch1").into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["orderer0", "orderer1", "orderer2"]);
        assert!(registry.orderers("unknown").is_empty());
    }

    #[test]
    fn test_duplicate_peer_name_replaced() {
        let registry = ConnectionRegistry::builder()
            .peer("peer0", "Org1", vec![], Arc::new(Unreachable))
            .peer("peer0", "Org2", vec![], Arc::new(Unreachable))
            .build();
        assert_eq!(registry.peers_for_channel("any").len(), 1);
        assert_eq!(registry.peer("peer0").unwrap().org, "Org2");
    }
}
