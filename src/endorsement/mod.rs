//! Endorsement subsystem.
//!
//! # Data Flow
//! ```text
//! (channel, chaincode)
//!     → selector.rs (static org/rule policy OR discovery layouts)
//!     → EndorsementPlan { selections, requirement }
//!     → collector.rs (fan-out, per-peer deadline, wait for all)
//!     → evaluate (requirement met + identical payloads)
//!     → qualifying ProposalResponses for the assembler
//! ```
//!
//! # Design Decisions
//! - One explicit mode switch; static and discovery never mix
//! - Per-peer failures are data; only the aggregate result is an error
//! - Chaincode errors (status >= 400) count as per-peer failures and never
//!   reach the orderer

pub mod collector;
pub mod discovery;
pub mod selector;

pub use collector::{evaluate, EndorsementCollector, PeerResponse};
pub use discovery::ConfiguredDiscovery;
pub use selector::{EndorsementPlan, EndorsementStrategy, GroupSelector, Requirement, Selection};
