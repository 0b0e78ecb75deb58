//! Header, nonce and envelope helpers shared by every signed message.

use std::time::SystemTime;

use prost::Message;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::{CryptoSuite, Identity};
use crate::error::ClientResult;
use crate::protos::common::{ChannelHeader, Envelope, Header, HeaderType, Payload, SignatureHeader};

/// Length of proposal and seek nonces in bytes.
pub const NONCE_LEN: usize = 24;

/// Fresh nonce from the operating system CSPRNG.
pub fn new_nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Lowercase hex digest of `nonce ∥ creator`, the id peers recompute.
pub fn compute_tx_id(suite: &dyn CryptoSuite, nonce: &[u8], creator: &[u8]) -> String {
    let mut input = Vec::with_capacity(nonce.len() + creator.len());
    input.extend_from_slice(nonce);
    input.extend_from_slice(creator);
    hex::encode(suite.hash(&input))
}

pub fn timestamp_now() -> prost_types::Timestamp {
    prost_types::Timestamp::from(SystemTime::now())
}

pub fn channel_header(
    header_type: HeaderType,
    channel: &str,
    tx_id: &str,
    extension: Vec<u8>,
) -> ChannelHeader {
    ChannelHeader {
        r#type: header_type as i32,
        version: 0,
        timestamp: Some(timestamp_now()),
        channel_id: channel.to_string(),
        tx_id: tx_id.to_string(),
        epoch: 0,
        extension,
        tls_cert_hash: Vec::new(),
    }
}

pub fn signature_header(creator: &[u8], nonce: &[u8]) -> SignatureHeader {
    SignatureHeader {
        creator: creator.to_vec(),
        nonce: nonce.to_vec(),
    }
}

pub fn header(channel_header: &ChannelHeader, signature_header: &SignatureHeader) -> Header {
    Header {
        channel_header: channel_header.encode_to_vec(),
        signature_header: signature_header.encode_to_vec(),
    }
}

/// Wrap `data` under `header` and sign the payload bytes with `identity`.
pub fn signed_envelope(
    header: Header,
    data: Vec<u8>,
    identity: &Identity,
    suite: &dyn CryptoSuite,
) -> ClientResult<Envelope> {
    let payload = Payload {
        header: Some(header),
        data,
    }
    .encode_to_vec();
    let signature = suite.sign(&payload, &identity.private_key)?;
    Ok(Envelope { payload, signature })
}
