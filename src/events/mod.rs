//! Block event subsystem.
//!
//! # Data Flow
//! ```text
//! DeliverSource (full or filtered stream)
//!     → listener.rs (Disconnected → Connecting → Registered → Streaming)
//!     → decoder.rs (Block / FilteredBlock → BlockEventRecord)
//!     → caller's mpsc channel (status pump, CLI, subscribers)
//!
//! watchdog.rs, every tick:
//!     local height (tracker) vs chain height (qscc)
//!     → stall counted → threshold reached → disconnect + restart from local height
//! ```
//!
//! # Design Decisions
//! - The listener never retries; recovery belongs to the watchdog
//! - The watchdog only holds a handle and a factory, never listener internals
//! - Malformed payloads become error-carrying records; the stream continues
//! - Duplicate blocks after a restart are possible; consumers are idempotent

pub mod decoder;
pub mod listener;
pub mod types;
pub mod watchdog;

pub use listener::{EventListener, ListenerExit, ListenerHandle, ListenerState, StartPosition};
pub use types::{BlockEventRecord, ChaincodeEventRecord, TransactionRecord};
pub use watchdog::{ListenerFactory, LocalHeightSource, StallDetector, Watchdog, WatchdogAction};
