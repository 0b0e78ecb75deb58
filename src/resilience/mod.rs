//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to peer / orderer / discovery:
//!     → timeouts.rs (enforce per-call deadline)
//!     → On failure: the caller aggregates (collector, broadcaster)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every unary external call has a deadline
//! - No automatic retries: aggregate failures surface to the caller
//! - Stream recovery belongs to the watchdog, not to the listener

pub mod timeouts;

pub use timeouts::with_timeout;
