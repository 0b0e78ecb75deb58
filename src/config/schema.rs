//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the ledger client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Signing algorithm family.
    pub crypto: CryptoConfig,

    /// Submitting identity.
    pub identity: IdentityConfig,

    /// Default channel and chaincode.
    pub channel: ChannelConfig,

    /// Endorsement selection strategy.
    pub endorsement: EndorsementConfig,

    /// Endorsing peers.
    pub peers: Vec<PeerConfig>,

    /// Ordering nodes.
    pub orderers: Vec<OrdererConfig>,

    /// Peers used as event sources.
    pub event_peers: Vec<EventPeerConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Event stream watchdog.
    pub watchdog: WatchdogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Signing algorithm configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Algorithm family. Only `ecdsa` (P-256, SHA-256) is supported.
    pub family: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            family: "ecdsa".to_string(),
        }
    }
}

/// Identity used to sign proposals, transactions and seek requests.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Organization membership id (e.g., "Org1MSP").
    pub msp_id: String,

    /// Path to the PEM certificate.
    pub cert_path: String,

    /// Path to the PKCS#8 PEM private key.
    pub key_path: String,
}

/// Default channel and chaincode used by the command line.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel id.
    pub name: String,

    /// Chaincode name.
    pub chaincode: String,

    /// Optional chaincode version.
    pub chaincode_version: Option<String>,
}

/// Selection strategy switch.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndorsementMode {
    #[default]
    Static,
    Discovery,
}

/// Combination rule of the static policy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyRule {
    #[default]
    And,
    Or,
}

/// Endorsement configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EndorsementConfig {
    /// Which strategy is active. Exactly one is ever used.
    pub mode: EndorsementMode,

    /// Organizations named by the static policy.
    pub orgs: Vec<String>,

    /// Combination rule of the static policy.
    pub rule: PolicyRule,

    /// Layouts served by the configured discovery source
    /// (group label → minimum count).
    pub layouts: Vec<BTreeMap<String, usize>>,
}

/// TLS settings for one endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to the CA certificate (PEM).
    pub ca_path: String,

    /// Server name override for certificate verification.
    #[serde(default)]
    pub server_name: Option<String>,
}

/// Endorsing peer definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeerConfig {
    /// Unique peer name.
    pub name: String,

    /// Organization (group label) the peer belongs to.
    pub org: String,

    /// Endpoint URL (e.g., "grpcs://peer0.org1.example.com:7051").
    pub url: String,

    /// Channels the peer has joined.
    #[serde(default)]
    pub channels: Vec<String>,

    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// Ordering node definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrdererConfig {
    pub name: String,

    /// Channel served by this node.
    pub channel: String,

    pub url: String,

    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// Event source definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventPeerConfig {
    pub name: String,

    pub channel: String,

    pub url: String,

    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// Timeout configuration for network calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Per-peer proposal timeout in seconds.
    pub proposal_secs: u64,

    /// Per-orderer broadcast timeout in seconds.
    pub broadcast_secs: u64,

    /// Ceiling of a synchronous wait for commit, in seconds.
    pub sync_wait_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            proposal_secs: 30,
            broadcast_secs: 10,
            sync_wait_secs: 30,
        }
    }
}

/// Event stream watchdog configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Supervise status listeners.
    pub enabled: bool,

    /// Tick interval in seconds.
    pub interval_secs: u64,

    /// Consecutive stalls before a forced reconnect.
    pub stall_threshold: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            stall_threshold: 2,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
