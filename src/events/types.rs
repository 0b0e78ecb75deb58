//! Decoded block records.

use serde::Serialize;

use crate::protos::peer::TxValidationCode;

/// One delivered block, decoded.
///
/// A record with `error` set and nothing else stands for a block that
/// could not be decoded at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockEventRecord {
    pub channel: String,
    pub number: u64,
    /// Hex of the header's data hash.
    pub block_hash: String,
    pub previous_hash: String,
    pub filtered: bool,
    pub transactions: Vec<TransactionRecord>,
    /// Encoded block size in bytes.
    pub size: usize,
    /// Milliseconds since the Unix epoch when the block arrived.
    pub received_at_ms: i64,
    pub error: Option<String>,
}

impl BlockEventRecord {
    pub fn from_error(error: impl Into<String>, received_at_ms: i64) -> Self {
        Self {
            error: Some(error.into()),
            received_at_ms,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One transaction inside a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub tx_id: String,
    /// Position inside the block.
    pub index: usize,
    /// Transactions in the enclosing block.
    pub count: usize,
    /// `TxValidationCode`; 0 is valid.
    pub validation_code: i32,
    pub header_type: String,
    pub chaincode: Option<String>,
    pub chaincode_version: Option<String>,
    /// Invocation arguments (full blocks only).
    pub args: Vec<Vec<u8>>,
    pub events: Vec<ChaincodeEventRecord>,
    /// Milliseconds since the Unix epoch from the channel header.
    pub timestamp_ms: Option<i64>,
    /// Block arrival minus transaction timestamp.
    pub commit_latency_ms: Option<i64>,
    /// Hex SHA-256 of the transaction envelope (full blocks only).
    pub tx_hash: Option<String>,
    /// Encoded envelope size in bytes (full blocks only).
    pub size_bytes: Option<usize>,
    pub error: Option<String>,
}

impl TransactionRecord {
    pub fn is_valid(&self) -> bool {
        self.validation_code == TxValidationCode::Valid as i32
    }

    /// Upstream name of the validation code, or the number if unknown.
    pub fn validation_name(&self) -> String {
        TxValidationCode::try_from(self.validation_code)
            .map(|code| format!("{:?}", code))
            .unwrap_or_else(|_| self.validation_code.to_string())
    }
}

/// Event emitted by chaincode during simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChaincodeEventRecord {
    pub chaincode_id: String,
    pub tx_id: String,
    pub event_name: String,
    pub payload: Vec<u8>,
}
