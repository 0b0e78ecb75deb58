//! ECDSA over P-256 with SHA-256, the default suite of the network.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::crypto::{CryptoSuite, PrivateKey};
use crate::error::{ClientError, ClientResult};

/// P-256 suite producing DER signatures normalised to low-S.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaP256Suite;

impl EcdsaP256Suite {
    pub fn new() -> Self {
        Self
    }

    /// Uncompressed SEC1 public key for `key`.
    pub fn public_key(&self, key: &PrivateKey) -> ClientResult<Vec<u8>> {
        let signing = signing_key(key)?;
        let verifying = VerifyingKey::from(&signing);
        Ok(verifying.to_encoded_point(false).as_bytes().to_vec())
    }
}

fn signing_key(key: &PrivateKey) -> ClientResult<SigningKey> {
    SigningKey::from_slice(key.as_bytes())
        .map_err(|e| ClientError::Signing(format!("Invalid P-256 private key: {}", e)))
}

impl CryptoSuite for EcdsaP256Suite {
    fn sign(&self, message: &[u8], key: &PrivateKey) -> ClientResult<Vec<u8>> {
        let signing = signing_key(key)?;
        let signature: Signature = signing
            .try_sign(message)
            .map_err(|e| ClientError::Signing(e.to_string()))?;
        // Peers reject high-S signatures.
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> ClientResult<bool> {
        let verifying = VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|e| ClientError::Signing(format!("Invalid public key: {}", e)))?;
        let signature = Signature::from_der(signature)
            .map_err(|e| ClientError::Signing(format!("Invalid signature encoding: {}", e)))?;
        Ok(verifying.verify(message, &signature).is_ok())
    }

    fn hash(&self, message: &[u8]) -> Vec<u8> {
        Sha256::digest(message).to_vec()
    }
}
