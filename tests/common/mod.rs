//! In-memory network nodes shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use prost::Message;
use tokio::sync::broadcast;

use fabric_client::config::schema::{ClientConfig, EndorsementMode, PolicyRule};
use fabric_client::crypto::{EcdsaP256Suite, Identity, PrivateKey};
use fabric_client::error::{ClientResult, TransportError};
use fabric_client::protos::common::{ChannelHeader, Envelope, HeaderType, Payload, Status};
use fabric_client::protos::orderer::{seek_position, BroadcastResponse, SeekInfo};
use fabric_client::protos::peer::{
    deliver_response, DeliverResponse, Endorsement, FilteredBlock, FilteredTransaction,
    ProposalResponse, Response, SignedProposal, TxValidationCode,
};
use fabric_client::transport::{
    ChainHeightSource, DeliverKind, DeliverSource, DeliverStream, Endorser, Orderer,
};
use fabric_client::FabricClient;

pub const CHANNEL: &str = "mychannel";
pub const CHAINCODE: &str = "basic";

pub fn identity() -> Identity {
    Identity::new(
        "Org1MSP",
        b"-----BEGIN CERTIFICATE-----".to_vec(),
        PrivateKey::from_bytes(vec![7u8; 32]),
    )
}

pub fn static_config(orgs: &[&str], rule: PolicyRule) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.channel.name = CHANNEL.to_string();
    config.channel.chaincode = CHAINCODE.to_string();
    config.endorsement.mode = EndorsementMode::Static;
    config.endorsement.orgs = orgs.iter().map(|o| o.to_string()).collect();
    config.endorsement.rule = rule;
    config.watchdog.enabled = false;
    config
}

pub fn client(config: ClientConfig, registry: fabric_client::transport::ConnectionRegistry) -> FabricClient {
    FabricClient::new(
        config,
        Arc::new(registry),
        identity(),
        Arc::new(EcdsaP256Suite::new()),
    )
}

/// Endorser with a fixed answer that counts its calls.
pub struct MockEndorser {
    pub calls: AtomicUsize,
    outcome: Result<i32, TransportError>,
}

impl MockEndorser {
    pub fn endorsing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Ok(200),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: Err(TransportError::Unavailable("connection refused".into())),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Endorser for MockEndorser {
    async fn process_proposal(
        &self,
        _proposal: &SignedProposal,
    ) -> Result<ProposalResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = self.outcome.clone()?;
        Ok(ProposalResponse {
            version: 1,
            timestamp: None,
            response: Some(Response {
                status,
                message: String::new(),
                payload: b"ok".to_vec(),
            }),
            payload: b"proposal-response-payload".to_vec(),
            endorsement: Some(Endorsement {
                endorser: b"endorser".to_vec(),
                signature: b"signature".to_vec(),
            }),
        })
    }
}

/// Transaction id carried in an envelope's channel header.
pub fn envelope_tx_id(envelope: &Envelope) -> String {
    let payload = Payload::decode(envelope.payload.as_slice()).unwrap();
    let header = payload.header.unwrap();
    ChannelHeader::decode(header.channel_header.as_slice())
        .unwrap()
        .tx_id
}

/// Ordering node: reachable with a fixed status, or unreachable.
pub struct MockOrderer {
    status: Option<Status>,
    pub received: Mutex<Vec<Envelope>>,
    ledger: Option<MockLedger>,
}

impl MockOrderer {
    pub fn accepting() -> Arc<Self> {
        Self::answering(Status::Success)
    }

    pub fn answering(status: Status) -> Arc<Self> {
        Arc::new(Self {
            status: Some(status),
            received: Mutex::new(Vec::new()),
            ledger: None,
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            status: None,
            received: Mutex::new(Vec::new()),
            ledger: None,
        })
    }

    /// Accepts and commits every transaction into `ledger` as a valid one.
    pub fn committing(ledger: MockLedger) -> Arc<Self> {
        Arc::new(Self {
            status: Some(Status::Success),
            received: Mutex::new(Vec::new()),
            ledger: Some(ledger),
        })
    }

    pub fn received(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn last_tx_id(&self) -> Option<String> {
        self.received.lock().unwrap().last().map(envelope_tx_id)
    }
}

#[async_trait]
impl Orderer for MockOrderer {
    async fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastResponse, TransportError> {
        let status = self
            .status
            .ok_or_else(|| TransportError::Unavailable("connection refused".into()))?;
        self.received.lock().unwrap().push(envelope.clone());
        if let Some(ledger) = &self.ledger {
            ledger.commit(&[(envelope_tx_id(envelope), TxValidationCode::Valid)]);
        }
        Ok(BroadcastResponse {
            status: status as i32,
            info: String::new(),
        })
    }

    async fn check_connection(&self) -> Result<(), TransportError> {
        self.status
            .map(|_| ())
            .ok_or_else(|| TransportError::Unavailable("connection refused".into()))
    }
}

/// Filtered block feed shared by a committing orderer and deliver sources.
#[derive(Clone)]
pub struct MockLedger {
    blocks: broadcast::Sender<DeliverResponse>,
    height: Arc<AtomicU64>,
}

impl MockLedger {
    pub fn new() -> Self {
        let (blocks, _) = broadcast::channel(64);
        Self {
            blocks,
            height: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Append one block holding `transactions`; returns its number.
    pub fn commit(&self, transactions: &[(String, TxValidationCode)]) -> u64 {
        let number = self.height.fetch_add(1, Ordering::SeqCst);
        let block = FilteredBlock {
            channel_id: CHANNEL.to_string(),
            number,
            filtered_transactions: transactions
                .iter()
                .map(|(tx_id, code)| FilteredTransaction {
                    txid: tx_id.clone(),
                    r#type: HeaderType::EndorserTransaction as i32,
                    tx_validation_code: *code as i32,
                    transaction_actions: None,
                })
                .collect(),
        };
        let _ = self.blocks.send(DeliverResponse {
            r#type: Some(deliver_response::Type::FilteredBlock(block)),
        });
        number
    }
}

#[async_trait]
impl DeliverSource for MockLedger {
    async fn deliver(&self, _kind: DeliverKind, _seek: Envelope) -> Result<DeliverStream, TransportError> {
        let receiver = self.blocks.subscribe();
        let blocks = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(response) => return Some((Ok(response), receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(blocks.boxed())
    }
}

/// Decrements the open-stream count when the stream is dropped.
struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deliver source that sends one block per connection, then goes silent.
pub struct StallingSource {
    pub seeks: Mutex<Vec<Envelope>>,
    open: Arc<AtomicUsize>,
    block: u64,
}

impl StallingSource {
    pub fn new(block: u64) -> Arc<Self> {
        Arc::new(Self {
            seeks: Mutex::new(Vec::new()),
            open: Arc::new(AtomicUsize::new(0)),
            block,
        })
    }

    pub fn connections(&self) -> usize {
        self.seeks.lock().unwrap().len()
    }

    /// Streams not yet dropped by their listener.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Start block requested by the `n`th connection.
    pub fn seek_start(&self, n: usize) -> Option<u64> {
        let envelope = self.seeks.lock().unwrap()[n].clone();
        let payload = Payload::decode(envelope.payload.as_slice()).unwrap();
        let seek = SeekInfo::decode(payload.data.as_slice()).unwrap();
        match seek.start.and_then(|s| s.r#type) {
            Some(seek_position::Type::Specified(specified)) => Some(specified.number),
            _ => None,
        }
    }
}

#[async_trait]
impl DeliverSource for StallingSource {
    async fn deliver(&self, _kind: DeliverKind, seek: Envelope) -> Result<DeliverStream, TransportError> {
        self.seeks.lock().unwrap().push(seek);
        let block = DeliverResponse {
            r#type: Some(deliver_response::Type::FilteredBlock(FilteredBlock {
                channel_id: CHANNEL.to_string(),
                number: self.block,
                filtered_transactions: Vec::new(),
            })),
        };
        self.open.fetch_add(1, Ordering::SeqCst);
        let guard = OpenGuard(self.open.clone());
        Ok(stream::iter(vec![Ok(block)])
            .chain(stream::pending())
            .map(move |item| {
                let _held = &guard;
                item
            })
            .boxed())
    }
}

/// Chain height fixed by the test.
pub struct FixedHeight(pub AtomicU64);

#[async_trait]
impl ChainHeightSource for FixedHeight {
    async fn chain_height(&self, _channel: &str) -> ClientResult<u64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

/// Let spawned tasks run without advancing a paused clock by much.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
