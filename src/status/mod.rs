//! Transaction status subsystem.
//!
//! # Data Flow
//! ```text
//! invoke_and_wait:
//!     broker.register(tx_id) → TxWaiter      (before broadcast)
//!     broadcast → waiter.wait(30s)           (status or Timeout)
//!     drop(TxWaiter) → broker.unregister      (every exit path)
//!
//! service.rs (one per channel):
//!     filtered EventListener → mpsc → pump
//!         → HeightTracker::observe(block number)
//!         → broker.publish(TxStatus) per transaction
//!     Watchdog(HeightTracker, chain height, listener factory)
//! ```
//!
//! # Design Decisions
//! - The waiter map is a `DashMap`; every register/publish/unregister takes
//!   the shard lock for that id only
//! - Publishing to an unknown id is a no-op; duplicate deliveries are dropped
//!   once the waiter's single slot is full

pub mod broker;
pub mod height;
pub mod service;

pub use broker::{StatusBroker, TxStatus, TxWaiter};
pub use height::HeightTracker;
pub use service::{StatusService, StatusServiceHandle};
