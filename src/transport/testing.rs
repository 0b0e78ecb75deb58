//! In-memory transports for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::protos::peer::{Endorsement, ProposalResponse, Response, SignedProposal};
use crate::transport::{Endorser, Peer};

/// Endorser answering every call with the same scripted result.
pub struct ScriptedEndorser {
    pub result: Result<ProposalResponse, TransportError>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedEndorser {
    pub fn endorsing(payload: &[u8]) -> Self {
        Self::with_result(Ok(endorsed_response(200, payload)))
    }

    pub fn with_result(result: Result<ProposalResponse, TransportError>) -> Self {
        Self {
            result,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Endorser for ScriptedEndorser {
    async fn process_proposal(
        &self,
        _proposal: &SignedProposal,
    ) -> Result<ProposalResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}

pub fn endorsed_response(status: i32, payload: &[u8]) -> ProposalResponse {
    ProposalResponse {
        version: 1,
        timestamp: None,
        response: Some(Response {
            status,
            message: String::new(),
            payload: b"result".to_vec(),
        }),
        payload: payload.to_vec(),
        endorsement: Some(Endorsement {
            endorser: b"endorser".to_vec(),
            signature: b"signature".to_vec(),
        }),
    }
}

pub fn peer(name: &str, org: &str, endorser: Arc<dyn Endorser>) -> Peer {
    Peer {
        name: name.to_string(),
        org: org.to_string(),
        channels: Vec::new(),
        endorser,
    }
}

pub fn idle_peer(name: &str, org: &str) -> Peer {
    peer(name, org, Arc::new(ScriptedEndorser::endorsing(b"prp")))
}
