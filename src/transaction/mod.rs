//! Transaction subsystem.
//!
//! # Data Flow
//! ```text
//! Proposal + qualifying ProposalResponses
//!     → assembler.rs (endorsed action, transient map stripped, signed Envelope)
//!     → broadcaster.rs (orderers of the channel in stable order)
//!     → SubmitResult { status, tx_id }   (acknowledgement, not commitment)
//! ```
//!
//! # Design Decisions
//! - The first orderer that answers at all decides; its status is data
//! - Transport failures move on to the next node and are only logged
//! - Commitment is observed through the event stream, never here
//! - Connectivity checks reach every node and submit nothing

pub mod assembler;
pub mod broadcaster;

pub use assembler::assemble_transaction;
pub use broadcaster::{Broadcaster, OrdererHealth, SubmitResult};
