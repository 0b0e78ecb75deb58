//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (policy orgs have peers, names are unique)
//! - Validate value ranges (timeouts > 0, URLs parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before any network handle is created

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::schema::{ClientConfig, EndorsementMode};

/// One semantic violation, addressed by its config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.crypto.family != "ecdsa" {
        errors.push(ValidationError::new(
            "crypto.family",
            format!("unsupported algorithm family '{}'", config.crypto.family),
        ));
    }

    if config.identity.msp_id.trim().is_empty() {
        errors.push(ValidationError::new("identity.msp_id", "must not be empty"));
    }
    if config.identity.cert_path.is_empty() {
        errors.push(ValidationError::new("identity.cert_path", "must not be empty"));
    }
    if config.identity.key_path.is_empty() {
        errors.push(ValidationError::new("identity.key_path", "must not be empty"));
    }

    let mut names = HashSet::new();
    for (i, peer) in config.peers.iter().enumerate() {
        if !names.insert(peer.name.as_str()) {
            errors.push(ValidationError::new(
                format!("peers[{}].name", i),
                format!("duplicate peer name '{}'", peer.name),
            ));
        }
        if peer.org.is_empty() {
            errors.push(ValidationError::new(format!("peers[{}].org", i), "must not be empty"));
        }
        check_url(&mut errors, format!("peers[{}].url", i), &peer.url);
    }

    let mut orderer_names = HashSet::new();
    for (i, orderer) in config.orderers.iter().enumerate() {
        if !orderer_names.insert((orderer.channel.as_str(), orderer.name.as_str())) {
            errors.push(ValidationError::new(
                format!("orderers[{}].name", i),
                format!("duplicate orderer '{}' on channel '{}'", orderer.name, orderer.channel),
            ));
        }
        if orderer.channel.is_empty() {
            errors.push(ValidationError::new(
                format!("orderers[{}].channel", i),
                "must not be empty",
            ));
        }
        check_url(&mut errors, format!("orderers[{}].url", i), &orderer.url);
    }

    for (i, event_peer) in config.event_peers.iter().enumerate() {
        if event_peer.channel.is_empty() {
            errors.push(ValidationError::new(
                format!("event_peers[{}].channel", i),
                "must not be empty",
            ));
        }
        check_url(&mut errors, format!("event_peers[{}].url", i), &event_peer.url);
    }

    match config.endorsement.mode {
        EndorsementMode::Static => {
            if config.endorsement.orgs.is_empty() {
                errors.push(ValidationError::new(
                    "endorsement.orgs",
                    "static mode requires at least one organization",
                ));
            }
            for org in &config.endorsement.orgs {
                if !config.peers.iter().any(|p| &p.org == org) {
                    errors.push(ValidationError::new(
                        "endorsement.orgs",
                        format!("organization '{}' has no configured peer", org),
                    ));
                }
            }
        }
        EndorsementMode::Discovery => {
            if config.endorsement.layouts.is_empty() {
                errors.push(ValidationError::new(
                    "endorsement.layouts",
                    "discovery mode requires at least one layout",
                ));
            }
            for (i, layout) in config.endorsement.layouts.iter().enumerate() {
                if layout.is_empty() {
                    errors.push(ValidationError::new(
                        format!("endorsement.layouts[{}]", i),
                        "layout must name at least one group",
                    ));
                }
                if layout.values().any(|count| *count == 0) {
                    errors.push(ValidationError::new(
                        format!("endorsement.layouts[{}]", i),
                        "group counts must be > 0",
                    ));
                }
            }
        }
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.proposal_secs", timeouts.proposal_secs),
        ("timeouts.broadcast_secs", timeouts.broadcast_secs),
        ("timeouts.sync_wait_secs", timeouts.sync_wait_secs),
        ("watchdog.interval_secs", config.watchdog.interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be > 0"));
        }
    }
    if config.watchdog.stall_threshold == 0 {
        errors.push(ValidationError::new("watchdog.stall_threshold", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: String, raw: &str) {
    match Url::parse(raw) {
        Ok(url) => {
            if !matches!(url.scheme(), "grpc" | "grpcs" | "http" | "https") {
                errors.push(ValidationError::new(
                    field,
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            } else if url.host_str().is_none() {
                errors.push(ValidationError::new(field, "missing host"));
            }
        }
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}
