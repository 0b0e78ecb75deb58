//! Proposal construction subsystem.
//!
//! # Data Flow
//! ```text
//! ChaincodeInvocation (channel, chaincode, args, transient)
//!     → header.rs (nonce from OS CSPRNG, tx id, channel + signature headers)
//!     → builder.rs (Proposal: header + chaincode proposal payload)
//!     → CryptoSuite::sign → SignedProposal (identical bytes for every peer)
//! ```
//!
//! # Design Decisions
//! - The nonce is the only entropy; it always comes from `OsRng`
//! - The signed bytes are produced once and shared by reference
//! - Header helpers are reused by the assembler and the seek request

pub mod builder;
pub mod header;

pub use builder::{ChaincodeInvocation, Proposal, ProposalBuilder, SignedProposal};
