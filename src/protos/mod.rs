//! Protobuf messages of the ledger wire protocol.
//!
//! # Data Flow
//! ```text
//! proposal/ builds    peer::Proposal → peer::SignedProposal
//! endorsers return    peer::ProposalResponse
//! transaction/ wraps  peer::Transaction → common::Payload → common::Envelope
//! orderers return     orderer::BroadcastResponse
//! deliver streams     peer::DeliverResponse { Block | FilteredBlock | Status }
//! ```
//!
//! # Design Decisions
//! - Declared with `prost` derives so no build script or protoc is needed
//! - Field tags follow the upstream `.proto` files exactly; unknown fields
//!   are skipped by prost so newer peers stay compatible
//! - Only the messages this client reads or writes are declared

pub mod common;
pub mod orderer;
pub mod peer;
