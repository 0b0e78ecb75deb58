//! Query client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use serde::Serialize;

use crate::crypto::{CryptoSuite, Identity};
use crate::error::{ClientError, ClientResult};
use crate::events::decoder::{decode_block, decode_transaction_envelope, now_ms};
use crate::events::{BlockEventRecord, TransactionRecord};
use crate::proposal::builder::{ChaincodeInvocation, ProposalBuilder};
use crate::protos::common::{Block, BlockchainInfo};
use crate::protos::peer::ProcessedTransaction;
use crate::resilience::with_timeout;
use crate::transport::{ChainHeightSource, ConnectionRegistry};

/// Query system chaincode.
pub const QSCC: &str = "qscc";

/// Ledger summary of a channel as reported by one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    /// Number of blocks.
    pub height: u64,
    /// Hex hash of the last block's header.
    pub current_block_hash: String,
    pub previous_block_hash: String,
}

impl From<BlockchainInfo> for ChainInfo {
    fn from(info: BlockchainInfo) -> Self {
        Self {
            height: info.height,
            current_block_hash: hex::encode(&info.current_block_hash),
            previous_block_hash: hex::encode(&info.previous_block_hash),
        }
    }
}

#[derive(Clone)]
pub struct QueryClient {
    registry: Arc<ConnectionRegistry>,
    identity: Arc<Identity>,
    suite: Arc<dyn CryptoSuite>,
    timeout: Duration,
}

impl QueryClient {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        identity: Arc<Identity>,
        suite: Arc<dyn CryptoSuite>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            identity,
            suite,
            timeout,
        }
    }

    /// Evaluate `invocation` on one peer and return the chaincode's payload.
    pub async fn query(&self, invocation: &ChaincodeInvocation) -> ClientResult<Vec<u8>> {
        let signed = ProposalBuilder::new(&self.identity, self.suite.as_ref()).build_signed(invocation)?;

        let mut peers = self.registry.peers_for_channel(&invocation.channel);
        if peers.is_empty() {
            return Err(ClientError::NoAvailablePeer(format!(
                "no peer serves channel '{}'",
                invocation.channel
            )));
        }
        fastrand::shuffle(&mut peers);

        let mut last_error = None;
        for peer in &peers {
            match with_timeout(self.timeout, peer.endorser.process_proposal(&signed.wire)).await {
                Ok(response) => {
                    let answer = response.response.unwrap_or_default();
                    if !(200..400).contains(&answer.status) {
                        return Err(ClientError::QueryFailed(format!(
                            "{} returned {}: {}",
                            peer.name, answer.status, answer.message
                        )));
                    }
                    tracing::debug!(
                        peer = %peer.name,
                        chaincode = %invocation.chaincode,
                        bytes = answer.payload.len(),
                        "Query answered"
                    );
                    return Ok(answer.payload);
                }
                Err(e) => {
                    tracing::warn!(peer = %peer.name, error = %e, "Query failed, trying next peer");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(ClientError::Transport)
            .unwrap_or_else(|| ClientError::NoAvailablePeer(invocation.channel.clone())))
    }

    async fn qscc(&self, channel: &str, args: Vec<String>) -> ClientResult<Vec<u8>> {
        let invocation = ChaincodeInvocation::new(channel, QSCC).with_args(args);
        self.query(&invocation).await
    }

    pub async fn chain_info(&self, channel: &str) -> ClientResult<ChainInfo> {
        let bytes = self
            .qscc(channel, vec!["GetChainInfo".to_string(), channel.to_string()])
            .await?;
        Ok(BlockchainInfo::decode(bytes.as_slice())?.into())
    }

    /// Number of blocks on the ledger of `channel`.
    pub async fn chain_height(&self, channel: &str) -> ClientResult<u64> {
        Ok(self.chain_info(channel).await?.height)
    }

    pub async fn block_by_number(&self, channel: &str, number: u64) -> ClientResult<BlockEventRecord> {
        let bytes = self
            .qscc(
                channel,
                vec![
                    "GetBlockByNumber".to_string(),
                    channel.to_string(),
                    number.to_string(),
                ],
            )
            .await?;
        let block = Block::decode(bytes.as_slice())?;
        Ok(decode_block(&block, now_ms()))
    }

    pub async fn transaction_by_id(&self, channel: &str, tx_id: &str) -> ClientResult<TransactionRecord> {
        let bytes = self
            .qscc(
                channel,
                vec![
                    "GetTransactionByID".to_string(),
                    channel.to_string(),
                    tx_id.to_string(),
                ],
            )
            .await?;
        let processed = ProcessedTransaction::decode(bytes.as_slice())?;
        let envelope = processed
            .transaction_envelope
            .ok_or_else(|| ClientError::Decode(format!("transaction {} has no envelope", tx_id)))?;
        Ok(decode_transaction_envelope(
            &envelope.encode_to_vec(),
            processed.validation_code,
            now_ms(),
        ))
    }
}

#[async_trait]
impl ChainHeightSource for QueryClient {
    async fn chain_height(&self, channel: &str) -> ClientResult<u64> {
        QueryClient::chain_height(self, channel).await
    }
}
