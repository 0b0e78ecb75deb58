//! Block decoding.
//!
//! # Responsibilities
//! - Unwrap Envelope → Payload → ChannelHeader / Transaction → action →
//!   invocation input and chaincode events
//! - Read each transaction's validation code from the block metadata bitmap
//! - Turn every decode failure into data on the record it concerns

use std::time::{SystemTime, UNIX_EPOCH};

use prost::Message;
use sha2::{Digest, Sha256};

use crate::error::{ClientError, ClientResult};
use crate::events::types::{BlockEventRecord, ChaincodeEventRecord, TransactionRecord};
use crate::protos::common::{
    Block, ChannelHeader, Envelope, HeaderType, Payload, BLOCK_METADATA_TRANSACTIONS_FILTER,
};
use crate::protos::peer::{
    deliver_response, ChaincodeAction, ChaincodeActionPayload, ChaincodeEvent,
    ChaincodeHeaderExtension, ChaincodeInvocationSpec, ChaincodeProposalPayload, DeliverResponse,
    FilteredBlock, ProposalResponsePayload, Transaction, TxValidationCode,
};

/// One message of a deliver stream, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliverEvent {
    Record(BlockEventRecord),
    /// Final status of the stream (`common.Status`).
    Status(i32),
    Empty,
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub fn decode_deliver_response(response: DeliverResponse, received_at_ms: i64) -> DeliverEvent {
    match response.r#type {
        Some(deliver_response::Type::Status(status)) => DeliverEvent::Status(status),
        Some(deliver_response::Type::Block(block)) => {
            DeliverEvent::Record(decode_block(&block, received_at_ms))
        }
        Some(deliver_response::Type::FilteredBlock(block)) => {
            DeliverEvent::Record(decode_filtered_block(&block, received_at_ms))
        }
        None => DeliverEvent::Empty,
    }
}

/// Decode a full block.
pub fn decode_block(block: &Block, received_at_ms: i64) -> BlockEventRecord {
    let header = match &block.header {
        Some(header) => header,
        None => return BlockEventRecord::from_error("block has no header", received_at_ms),
    };
    let data = match &block.data {
        Some(data) => &data.data,
        None => return BlockEventRecord::from_error("block has no data", received_at_ms),
    };

    let filter: &[u8] = block
        .metadata
        .as_ref()
        .and_then(|m| m.metadata.get(BLOCK_METADATA_TRANSACTIONS_FILTER))
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let count = data.len();
    let transactions: Vec<DecodedTransaction> = data
        .iter()
        .enumerate()
        .map(|(index, envelope)| {
            let code = filter
                .get(index)
                .map(|code| *code as i32)
                .unwrap_or(TxValidationCode::NotValidated as i32);
            decode_transaction(envelope, index, count, code, received_at_ms)
        })
        .collect();

    let channel = transactions
        .iter()
        .find_map(|tx| tx.channel.clone())
        .unwrap_or_default();

    BlockEventRecord {
        channel,
        number: header.number,
        block_hash: hex::encode(&header.data_hash),
        previous_hash: hex::encode(&header.previous_hash),
        filtered: false,
        transactions: transactions.into_iter().map(|tx| tx.record).collect(),
        size: block.encoded_len(),
        received_at_ms,
        error: None,
    }
}

/// Decode a filtered block (ids, codes and chaincode events only).
pub fn decode_filtered_block(block: &FilteredBlock, received_at_ms: i64) -> BlockEventRecord {
    let count = block.filtered_transactions.len();
    let transactions = block
        .filtered_transactions
        .iter()
        .enumerate()
        .map(|(index, tx)| TransactionRecord {
            tx_id: tx.txid.clone(),
            index,
            count,
            validation_code: tx.tx_validation_code,
            header_type: header_type_name(tx.r#type),
            events: tx
                .transaction_actions
                .iter()
                .flat_map(|actions| actions.chaincode_actions.iter())
                .filter_map(|action| action.chaincode_event.as_ref())
                .map(event_record)
                .collect(),
            ..Default::default()
        })
        .collect();

    BlockEventRecord {
        channel: block.channel_id.clone(),
        number: block.number,
        filtered: true,
        transactions,
        size: block.encoded_len(),
        received_at_ms,
        ..Default::default()
    }
}

struct DecodedTransaction {
    record: TransactionRecord,
    channel: Option<String>,
}

fn decode_transaction(
    envelope: &[u8],
    index: usize,
    count: usize,
    validation_code: i32,
    received_at_ms: i64,
) -> DecodedTransaction {
    let mut decoded = DecodedTransaction {
        record: TransactionRecord {
            index,
            count,
            validation_code,
            tx_hash: Some(hex::encode(Sha256::digest(envelope))),
            size_bytes: Some(envelope.len()),
            ..Default::default()
        },
        channel: None,
    };
    if let Err(e) = fill_transaction(&mut decoded, envelope, received_at_ms) {
        tracing::debug!(index, error = %e, "Transaction decode failed");
        decoded.record.error = Some(e.to_string());
    }
    decoded
}

/// Decode a standalone transaction envelope (e.g. from `GetTransactionByID`).
pub fn decode_transaction_envelope(
    envelope: &[u8],
    validation_code: i32,
    received_at_ms: i64,
) -> TransactionRecord {
    decode_transaction(envelope, 0, 1, validation_code, received_at_ms).record
}

fn fill_transaction(
    decoded: &mut DecodedTransaction,
    envelope: &[u8],
    received_at_ms: i64,
) -> ClientResult<()> {
    let envelope = Envelope::decode(envelope)?;
    let payload = Payload::decode(envelope.payload.as_slice())?;
    let header = payload
        .header
        .ok_or_else(|| ClientError::Decode("payload has no header".to_string()))?;
    let channel_header = ChannelHeader::decode(header.channel_header.as_slice())?;

    let record = &mut decoded.record;
    record.tx_id = channel_header.tx_id.clone();
    record.header_type = header_type_name(channel_header.r#type);
    decoded.channel = Some(channel_header.channel_id.clone());
    if let Some(ts) = &channel_header.timestamp {
        match timestamp_ms(ts) {
            Some(ms) => {
                record.timestamp_ms = Some(ms);
                record.commit_latency_ms = received_at_ms.checked_sub(ms);
            }
            None => {
                record.error = Some(format!(
                    "channel header timestamp out of range ({}s, {}ns)",
                    ts.seconds, ts.nanos
                ));
            }
        }
    }

    if channel_header.r#type != HeaderType::EndorserTransaction as i32 {
        return Ok(());
    }

    let extension = ChaincodeHeaderExtension::decode(channel_header.extension.as_slice())?;
    if let Some(id) = extension.chaincode_id {
        set_chaincode(record, &id.name, &id.version);
    }

    let transaction = Transaction::decode(payload.data.as_slice())?;
    let action = transaction
        .actions
        .first()
        .ok_or_else(|| ClientError::Decode("transaction has no actions".to_string()))?;
    let action_payload = ChaincodeActionPayload::decode(action.payload.as_slice())?;

    let proposal_payload =
        ChaincodeProposalPayload::decode(action_payload.chaincode_proposal_payload.as_slice())?;
    let spec = ChaincodeInvocationSpec::decode(proposal_payload.input.as_slice())?;
    if let Some(input) = spec.chaincode_spec.and_then(|s| s.input) {
        record.args = input.args;
    }

    if let Some(endorsed) = action_payload.action {
        let response_payload =
            ProposalResponsePayload::decode(endorsed.proposal_response_payload.as_slice())?;
        let chaincode_action = ChaincodeAction::decode(response_payload.extension.as_slice())?;
        if let Some(id) = &chaincode_action.chaincode_id {
            set_chaincode(record, &id.name, &id.version);
        }
        if !chaincode_action.events.is_empty() {
            let event = ChaincodeEvent::decode(chaincode_action.events.as_slice())?;
            record.events.push(event_record(&event));
        }
    }

    Ok(())
}

/// Milliseconds since the epoch; `None` when the value does not fit.
fn timestamp_ms(ts: &prost_types::Timestamp) -> Option<i64> {
    ts.seconds
        .checked_mul(1000)?
        .checked_add(i64::from(ts.nanos) / 1_000_000)
}

fn set_chaincode(record: &mut TransactionRecord, name: &str, version: &str) {
    if !name.is_empty() {
        record.chaincode = Some(name.to_string());
    }
    if !version.is_empty() {
        record.chaincode_version = Some(version.to_string());
    }
}

fn header_type_name(value: i32) -> String {
    HeaderType::try_from(value)
        .map(|t| t.as_str_name().to_string())
        .unwrap_or_else(|_| format!("UNKNOWN({})", value))
}

fn event_record(event: &ChaincodeEvent) -> ChaincodeEventRecord {
    ChaincodeEventRecord {
        chaincode_id: event.chaincode_id.clone(),
        tx_id: event.tx_id.clone(),
        event_name: event.event_name.clone(),
        payload: event.payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EcdsaP256Suite, Identity, PrivateKey};
    use crate::proposal::{ChaincodeInvocation, ProposalBuilder};
    use crate::protos::common::{BlockData, BlockHeader, BlockMetadata, Status};
    use crate::protos::peer::{
        ChaincodeId, Endorsement, FilteredChaincodeAction, FilteredTransaction,
        FilteredTransactionActions, ProposalResponse, Response,
    };
    use crate::transaction::assemble_transaction;

    fn endorsed_envelope(args: &[&str], event_name: Option<&str>) -> (String, Vec<u8>) {
        let identity = Identity::new("Org1MSP", b"cert".to_vec(), PrivateKey::from_bytes(vec![7u8; 32]));
        let suite = EcdsaP256Suite::new();
        let invocation = ChaincodeInvocation::new("mychannel", "basic")
            .with_version("1.0")
            .with_args(args.iter().copied());
        let proposal = ProposalBuilder::new(&identity, &suite).build(&invocation).unwrap();

        let action = ChaincodeAction {
            results: Vec::new(),
            events: event_name
                .map(|name| {
                    ChaincodeEvent {
                        chaincode_id: "basic".into(),
                        tx_id: proposal.tx_id.clone(),
                        event_name: name.into(),
                        payload: b"event-payload".to_vec(),
                    }
                    .encode_to_vec()
                })
                .unwrap_or_default(),
            response: None,
            chaincode_id: Some(ChaincodeId {
                path: String::new(),
                name: "basic".into(),
                version: "1.0".into(),
            }),
        };
        let response = ProposalResponse {
            version: 1,
            timestamp: None,
            response: Some(Response {
                status: 200,
                message: String::new(),
                payload: Vec::new(),
            }),
            payload: ProposalResponsePayload {
                proposal_hash: Vec::new(),
                extension: action.encode_to_vec(),
            }
            .encode_to_vec(),
            endorsement: Some(Endorsement {
                endorser: b"peer".to_vec(),
                signature: b"sig".to_vec(),
            }),
        };
        let envelope = assemble_transaction(&proposal, &[response], &identity, &suite).unwrap();
        (proposal.tx_id, envelope.encode_to_vec())
    }

    fn block(number: u64, envelopes: Vec<Vec<u8>>, filter: Option<Vec<u8>>) -> Block {
        let mut metadata = vec![Vec::new(), Vec::new()];
        if let Some(filter) = filter {
            metadata.push(filter);
        }
        Block {
            header: Some(BlockHeader {
                number,
                previous_hash: vec![0xaa; 4],
                data_hash: vec![0xbb; 4],
            }),
            data: Some(BlockData { data: envelopes }),
            metadata: Some(BlockMetadata { metadata }),
        }
    }

    #[test]
    fn test_bitmap_marks_only_invalid_transaction() {
        let (id0, tx0) = endorsed_envelope(&["set", "a", "1"], None);
        let (id1, tx1) = endorsed_envelope(&["set", "b", "2"], None);
        let (id2, tx2) = endorsed_envelope(&["set", "c", "3"], None);
        let mvcc = TxValidationCode::MvccReadConflict as u8;
        let block = block(9, vec![tx0, tx1, tx2], Some(vec![0, mvcc, 0]));

        let record = decode_block(&block, now_ms());
        assert!(record.error.is_none());
        assert_eq!(record.number, 9);
        assert_eq!(record.channel, "mychannel");
        assert_eq!(record.block_hash, "bbbbbbbb");
        assert_eq!(record.previous_hash, "aaaaaaaa");

        let txs = &record.transactions;
        assert_eq!(txs.len(), 3);
        assert_eq!((txs[0].tx_id.as_str(), txs[0].is_valid()), (id0.as_str(), true));
        assert_eq!(txs[1].tx_id, id1);
        assert!(!txs[1].is_valid());
        assert_eq!(txs[1].validation_code, TxValidationCode::MvccReadConflict as i32);
        assert_eq!(txs[1].validation_name(), "MvccReadConflict");
        assert_eq!((txs[2].tx_id.as_str(), txs[2].is_valid()), (id2.as_str(), true));
    }

    #[test]
    fn test_missing_bitmap_is_not_validated() {
        let (_, tx) = endorsed_envelope(&["get", "a"], None);
        let record = decode_block(&block(1, vec![tx], None), now_ms());
        assert_eq!(
            record.transactions[0].validation_code,
            TxValidationCode::NotValidated as i32
        );
    }

    #[test]
    fn test_full_block_exposes_args_and_events() {
        let (tx_id, tx) = endorsed_envelope(&["transfer", "alice", "bob"], Some("Transferred"));
        let received = now_ms();
        let record = decode_block(&block(3, vec![tx], Some(vec![0])), received);
        let tx = &record.transactions[0];

        assert_eq!(tx.header_type, "ENDORSER_TRANSACTION");
        assert_eq!(tx.chaincode.as_deref(), Some("basic"));
        assert_eq!(tx.chaincode_version.as_deref(), Some("1.0"));
        assert_eq!(tx.args[0], b"transfer".to_vec());
        assert_eq!(tx.args.len(), 3);
        assert_eq!(tx.events.len(), 1);
        assert_eq!(tx.events[0].event_name, "Transferred");
        assert_eq!(tx.events[0].tx_id, tx_id);
        assert!(tx.timestamp_ms.is_some());
        assert!(tx.commit_latency_ms.unwrap() >= 0);
        assert_eq!(tx.tx_hash.as_ref().map(String::len), Some(64));
        assert!(tx.size_bytes.unwrap() > 0);
        assert_eq!((tx.index, tx.count), (0, 1));
        assert!(record.size > 0);
    }

    #[test]
    fn test_malformed_transaction_is_isolated() {
        let (id, good) = endorsed_envelope(&["get", "a"], None);
        let block = block(4, vec![vec![0xff, 0xff, 0xff], good], Some(vec![0, 0]));
        let record = decode_block(&block, now_ms());

        assert!(record.error.is_none());
        assert!(record.transactions[0].error.is_some());
        assert!(record.transactions[1].error.is_none());
        assert_eq!(record.transactions[1].tx_id, id);
    }

    /// Re-encode `envelope` with its channel header timestamp replaced.
    fn with_timestamp(envelope: &[u8], seconds: i64, nanos: i32) -> Vec<u8> {
        let mut envelope = Envelope::decode(envelope).unwrap();
        let mut payload = Payload::decode(envelope.payload.as_slice()).unwrap();
        let mut header = payload.header.take().unwrap();
        let mut channel_header = ChannelHeader::decode(header.channel_header.as_slice()).unwrap();
        channel_header.timestamp = Some(prost_types::Timestamp { seconds, nanos });
        header.channel_header = channel_header.encode_to_vec();
        payload.header = Some(header);
        envelope.payload = payload.encode_to_vec();
        envelope.encode_to_vec()
    }

    #[test]
    fn test_overflowing_timestamp_is_reported_on_record() {
        let (tx_id, tx) = endorsed_envelope(&["set", "a", "1"], Some("Set"));
        let (_, sibling) = endorsed_envelope(&["get", "a"], None);
        let tx = with_timestamp(&tx, i64::MAX / 10, 0);
        let record = decode_block(&block(6, vec![tx, sibling], Some(vec![0, 0])), now_ms());

        assert!(record.error.is_none());
        let bad = &record.transactions[0];
        assert_eq!(bad.tx_id, tx_id);
        assert!(bad.error.as_deref().unwrap().contains("timestamp out of range"));
        assert_eq!(bad.timestamp_ms, None);
        assert_eq!(bad.commit_latency_ms, None);
        // The rest of the envelope still decodes.
        assert_eq!(bad.chaincode.as_deref(), Some("basic"));
        assert_eq!(bad.events[0].event_name, "Set");
        assert!(record.transactions[1].error.is_none());
    }

    #[test]
    fn test_latency_underflow_leaves_latency_empty() {
        let (_, tx) = endorsed_envelope(&["get", "a"], None);
        let tx = with_timestamp(&tx, i64::MAX / 1000, 0);
        let record = decode_block(&block(7, vec![tx], Some(vec![0])), i64::MIN);
        let tx = &record.transactions[0];

        assert!(tx.error.is_none());
        assert_eq!(tx.timestamp_ms, Some((i64::MAX / 1000) * 1000));
        assert_eq!(tx.commit_latency_ms, None);
    }

    #[test]
    fn test_block_without_header_yields_error_record() {
        let block = Block {
            header: None,
            data: None,
            metadata: None,
        };
        let record = decode_block(&block, 1234);
        assert!(record.is_error());
        assert_eq!(record.received_at_ms, 1234);
        assert!(record.transactions.is_empty());
        assert_eq!(record.number, 0);
    }

    #[test]
    fn test_filtered_block() {
        let filtered = FilteredBlock {
            channel_id: "mychannel".into(),
            number: 12,
            filtered_transactions: vec![
                FilteredTransaction {
                    txid: "tx-a".into(),
                    r#type: HeaderType::EndorserTransaction as i32,
                    tx_validation_code: TxValidationCode::Valid as i32,
                    transaction_actions: Some(FilteredTransactionActions {
                        chaincode_actions: vec![FilteredChaincodeAction {
                            chaincode_event: Some(ChaincodeEvent {
                                chaincode_id: "basic".into(),
                                tx_id: "tx-a".into(),
                                event_name: "Created".into(),
                                payload: Vec::new(),
                            }),
                        }],
                    }),
                },
                FilteredTransaction {
                    txid: "tx-b".into(),
                    r#type: HeaderType::EndorserTransaction as i32,
                    tx_validation_code: TxValidationCode::EndorsementPolicyFailure as i32,
                    transaction_actions: None,
                },
            ],
        };
        let record = decode_filtered_block(&filtered, now_ms());
        assert!(record.filtered);
        assert_eq!(record.number, 12);
        assert_eq!(record.channel, "mychannel");
        assert!(record.transactions[0].is_valid());
        assert_eq!(record.transactions[0].events[0].event_name, "Created");
        assert!(!record.transactions[1].is_valid());
        assert!(record.transactions[1].args.is_empty());
    }

    #[test]
    fn test_status_message_yields_no_record() {
        let response = DeliverResponse {
            r#type: Some(deliver_response::Type::Status(Status::Success as i32)),
        };
        assert_eq!(
            decode_deliver_response(response, 0),
            DeliverEvent::Status(Status::Success as i32)
        );
    }
}
