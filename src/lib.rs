//! Client for a permissioned ledger's transaction protocol.
//!
//! # Architecture Overview
//!
//! ```text
//!   invoke ─▶ proposal ─▶ endorsement ─────────▶ transaction ─▶ orderers
//!             (build,     (select peers,          (assemble,
//!              sign)       collect, evaluate)      broadcast + failover)
//!
//!   event peer ─▶ events::listener ─▶ decoder ─▶ status pump ─▶ status::broker ─▶ waiter
//!                       ▲                              │
//!                       └──── events::watchdog ◀───────┘ local height vs qscc height
//! ```
//!
//! [`FabricClient`] is the context object owning the registry, identity,
//! strategy and broker; every operation goes through it.

// Core pipelines
pub mod client;
pub mod endorsement;
pub mod events;
pub mod proposal;
pub mod query;
pub mod status;
pub mod transaction;

// Wire and network
pub mod crypto;
pub mod protos;
pub mod transport;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use client::{CommitOutcome, FabricClient};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, TransportError};
pub use lifecycle::Shutdown;
