//! Error taxonomy shared by every client operation.
//!
//! Per-peer and per-orderer failures are [`TransportError`]s; they are
//! absorbed by the collector and broadcaster. Only aggregate failures
//! surface to callers as a [`ClientError`].

use std::fmt;

use thiserror::Error;

/// Failure of a single network call to one peer or ordering node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The node could not be reached or the connection dropped.
    #[error("node unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its deadline.
    #[error("call timed out after {0} ms")]
    Timeout(u64),

    /// The node answered with an RPC-level error.
    #[error("rpc failed: {0}")]
    Rpc(String),
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable => TransportError::Unavailable(status.message().to_string()),
            tonic::Code::DeadlineExceeded => TransportError::Timeout(0),
            _ => TransportError::Rpc(format!("{:?}: {}", status.code(), status.message())),
        }
    }
}

/// One failed endorser, kept for diagnosis of an `EndorsementFailed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFailure {
    pub peer: String,
    pub group: String,
    pub reason: String,
}

impl fmt::Display for PeerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.peer, self.group, self.reason)
    }
}

/// Errors surfaced by public client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or inconsistent configuration; raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The identity cannot be used to sign (e.g. no organization id).
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// A message could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The signing collaborator rejected the payload or key.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A required organization (or the whole channel) has no reachable peer.
    #[error("no available peer: {0}")]
    NoAvailablePeer(String),

    /// Discovery returned no usable layout or no peers.
    #[error("no endorsement layout for {channel}/{chaincode}")]
    NoEndorsementLayout { channel: String, chaincode: String },

    /// The discovery collaborator could not be reached.
    #[error("discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The endorsement requirement was not met by the collected responses.
    #[error("endorsement failed: {reason} [{}]", join_failures(.failures))]
    EndorsementFailed {
        reason: String,
        failures: Vec<PeerFailure>,
    },

    /// Every ordering node of the channel was unreachable.
    #[error("all {attempted} ordering nodes for channel '{channel}' are unavailable")]
    OrdererUnavailable { channel: String, attempted: usize },

    /// The event stream dropped; recovered by the watchdog.
    #[error("event stream transport error: {0}")]
    StreamTransport(String),

    /// A wire payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A synchronous wait exceeded its deadline; the outcome is unknown.
    #[error("timed out after {0} ms waiting for transaction outcome")]
    Timeout(u64),

    /// A waiter for this transaction id is already registered.
    #[error("a waiter is already registered for transaction {0}")]
    DuplicateWait(String),

    /// A query reached a peer but the peer reported a failure.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A single network call failed outside of an aggregate operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

fn join_failures(failures: &[PeerFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<prost::DecodeError> for ClientError {
    fn from(err: prost::DecodeError) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<prost::EncodeError> for ClientError {
    fn from(err: prost::EncodeError) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endorsement_failed_lists_peers() {
        let err = ClientError::EndorsementFailed {
            reason: "rule AND not satisfied".to_string(),
            failures: vec![
                PeerFailure {
                    peer: "peer0".into(),
                    group: "Org1".into(),
                    reason: "timeout".into(),
                },
                PeerFailure {
                    peer: "peer1".into(),
                    group: "Org2".into(),
                    reason: "chaincode returned 500".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("peer0 (Org1): timeout"));
        assert!(text.contains("peer1 (Org2): chaincode returned 500"));
    }

    #[test]
    fn test_timeout_distinct_from_rejection() {
        let err = ClientError::Timeout(30_000);
        assert_eq!(
            err.to_string(),
            "timed out after 30000 ms waiting for transaction outcome"
        );
    }

    #[test]
    fn test_status_mapping() {
        let err: TransportError = tonic::Status::unavailable("connection refused").into();
        assert_eq!(err, TransportError::Unavailable("connection refused".into()));
        let err: TransportError = tonic::Status::internal("boom").into();
        assert!(matches!(err, TransportError::Rpc(_)));
    }
}
