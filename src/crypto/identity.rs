//! Caller identity: certificate, signing key and organization membership.

use std::fs;
use std::path::Path;

use p256::ecdsa::SigningKey;
use p256::pkcs8::DecodePrivateKey;
use prost::Message;

use crate::crypto::PrivateKey;
use crate::error::{ClientError, ClientResult};
use crate::protos::common::SerializedIdentity;

/// Credential holder used for every signing operation.
///
/// Immutable once loaded; passed by reference into the pipelines.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Organization membership id (MSP id).
    pub msp_id: String,
    /// PEM-encoded X.509 certificate.
    pub certificate: Vec<u8>,
    /// Signing key.
    pub private_key: PrivateKey,
}

impl Identity {
    pub fn new(msp_id: impl Into<String>, certificate: Vec<u8>, private_key: PrivateKey) -> Self {
        Self {
            msp_id: msp_id.into(),
            certificate,
            private_key,
        }
    }

    /// Load a PEM certificate and a PKCS#8 PEM P-256 key from disk.
    pub fn from_pem_files(msp_id: &str, cert_path: &Path, key_path: &Path) -> ClientResult<Self> {
        let certificate = fs::read(cert_path).map_err(|e| {
            ClientError::InvalidIdentity(format!("cannot read {}: {}", cert_path.display(), e))
        })?;
        let key_pem = fs::read_to_string(key_path).map_err(|e| {
            ClientError::InvalidIdentity(format!("cannot read {}: {}", key_path.display(), e))
        })?;
        let signing = SigningKey::from_pkcs8_pem(&key_pem)
            .map_err(|e| ClientError::InvalidIdentity(format!("Invalid private key: {}", e)))?;

        tracing::info!(
            msp_id = %msp_id,
            cert = %cert_path.display(),
            "Identity loaded"
        );

        Ok(Self::new(
            msp_id,
            certificate,
            PrivateKey::from_bytes(signing.to_bytes().to_vec()),
        ))
    }

    /// Serialized creator bytes embedded in signature headers.
    pub fn creator(&self) -> ClientResult<Vec<u8>> {
        if self.msp_id.trim().is_empty() {
            return Err(ClientError::InvalidIdentity(
                "identity has no organization id".to_string(),
            ));
        }
        if self.certificate.is_empty() {
            return Err(ClientError::InvalidIdentity(
                "identity has no certificate".to_string(),
            ));
        }
        Ok(SerializedIdentity {
            mspid: self.msp_id.clone(),
            id_bytes: self.certificate.clone(),
        }
        .encode_to_vec())
    }
}
