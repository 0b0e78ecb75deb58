//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → cancel token → listeners, pumps and watchdogs stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One cancellation tree per process; every long-running task owns a child token
//! - Cancelling a parent never waits on children; owners join their own tasks

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
