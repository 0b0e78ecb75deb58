//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → transport::ConnectionRegistry::from_config + FabricClient
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the client context owns it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Exactly one endorsement mode is active; there is no fallback order

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ClientConfig;
pub use schema::EndorsementMode;
pub use schema::PolicyRule;
