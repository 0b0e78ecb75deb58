//! Read-only queries: chaincode evaluation and ledger lookups.
//!
//! # Data Flow
//! ```text
//! QueryClient::query(invocation)
//!     → ProposalBuilder (signed proposal, never broadcast)
//!     → one peer of the channel, shuffled, next peer on transport failure
//!     → Response.payload
//!
//! Ledger lookups go through the query system chaincode (qscc):
//!     GetChainInfo        → ChainInfo (height + hashes; height feeds the watchdog)
//!     GetBlockByNumber    → Block → BlockEventRecord
//!     GetTransactionByID  → ProcessedTransaction → TransactionRecord
//! ```

pub mod client;

pub use client::{ChainInfo, QueryClient, QSCC};
