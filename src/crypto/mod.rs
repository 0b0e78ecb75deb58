//! Signing collaborator and caller identity.
//!
//! # Data Flow
//! ```text
//! config (msp id, cert path, key path)
//!     → identity.rs (Identity: certificate + private key + msp id)
//!     → CryptoSuite::sign(bytes, key) for proposals, envelopes, seek requests
//! ```
//!
//! # Security Constraints
//! - Private key material never appears in `Debug` output or logs
//! - The algorithm family is configuration; the pipelines only see the trait

pub mod ecdsa;
pub mod identity;

use std::fmt;
use std::sync::Arc;

pub use ecdsa::EcdsaP256Suite;
pub use identity::Identity;

use crate::error::{ClientError, ClientResult};

/// Raw private key bytes, interpreted by the active [`CryptoSuite`].
#[derive(Clone)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Opaque signing capability.
pub trait CryptoSuite: Send + Sync {
    /// Sign `message` with `key`, returning the encoded signature.
    fn sign(&self, message: &[u8], key: &PrivateKey) -> ClientResult<Vec<u8>>;

    /// Verify `signature` over `message` against an encoded public key.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> ClientResult<bool>;

    /// Digest used for transaction ids and proposal hashes.
    fn hash(&self, message: &[u8]) -> Vec<u8>;
}

/// Suite for a configured algorithm family.
pub fn suite_for(family: &str) -> ClientResult<Arc<dyn CryptoSuite>> {
    match family {
        "ecdsa" => Ok(Arc::new(EcdsaP256Suite::new())),
        other => Err(ClientError::Configuration(format!(
            "unsupported algorithm family '{}'",
            other
        ))),
    }
}
