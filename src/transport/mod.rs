//! Network transport subsystem.
//!
//! # Data Flow
//! ```text
//! ClientConfig (peers, orderers, event_peers)
//!     → registry.rs (ConnectionRegistry, built once, read-only afterwards)
//!     → grpc.rs (lazy tonic channels per endpoint)
//!
//! Pipelines only see the traits below:
//!     Endorser::process_proposal     (unary, per peer)
//!     Orderer::broadcast             (one envelope, first acknowledgement)
//!     Orderer::check_connection      (connectivity check, nothing submitted)
//!     DeliverSource::deliver         (long-lived block stream)
//!     Discovery::discover            (groups + layouts for a chaincode)
//!     ChainHeightSource::chain_height (authoritative ledger height)
//! ```
//!
//! # Design Decisions
//! - Traits sit at every network seam so tests run against in-memory nodes
//! - Per-call deadlines are applied by callers, not by the transports
//! - Channels connect lazily; building the registry performs no I/O

pub mod grpc;
pub mod registry;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::{ClientResult, TransportError};
use crate::protos::common::Envelope;
use crate::protos::orderer::BroadcastResponse;
use crate::protos::peer::{DeliverResponse, ProposalResponse, SignedProposal};

pub use registry::{ConnectionRegistry, EventPeer, OrdererNode, Peer, RegistryBuilder};

/// Endorsing peer: simulates a proposal and signs the result.
#[async_trait]
pub trait Endorser: Send + Sync {
    async fn process_proposal(
        &self,
        proposal: &SignedProposal,
    ) -> Result<ProposalResponse, TransportError>;
}

/// Ordering node accepting signed transaction envelopes.
#[async_trait]
pub trait Orderer: Send + Sync {
    async fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastResponse, TransportError>;

    /// Establish a connection without submitting anything.
    async fn check_connection(&self) -> Result<(), TransportError>;
}

/// Full blocks or the filtered (id + validation code) projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverKind {
    Full,
    Filtered,
}

/// Stream of deliver responses; ends on end-of-stream or first error.
pub type DeliverStream = BoxStream<'static, Result<DeliverResponse, TransportError>>;

/// Peer-side block event source.
#[async_trait]
pub trait DeliverSource: Send + Sync {
    /// Open a stream and send the signed seek envelope as its first message.
    ///
    /// The request side stays open until the returned stream is dropped.
    async fn deliver(
        &self,
        kind: DeliverKind,
        seek: Envelope,
    ) -> Result<DeliverStream, TransportError>;
}

/// Group label → minimum number of endorsements from that group.
pub type Layout = BTreeMap<String, usize>;

/// Discovery answer for one channel/chaincode pair.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredEndorsers {
    /// Available peers per group label.
    pub groups: BTreeMap<String, Vec<Peer>>,
    /// Acceptable layouts; any one fully satisfied endorses the proposal.
    pub layouts: Vec<Layout>,
}

/// Endorsement discovery collaborator.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Fails with `ClientError::DiscoveryUnavailable` when unreachable.
    async fn discover(
        &self,
        channel: &str,
        chaincodes: &[String],
    ) -> ClientResult<DiscoveredEndorsers>;
}

/// Authoritative ledger height of a channel.
#[async_trait]
pub trait ChainHeightSource: Send + Sync {
    async fn chain_height(&self, channel: &str) -> ClientResult<u64>;
}

#[cfg(test)]
pub(crate) mod testing;
