//! Discovery served from configuration.
//!
//! Groups are the configured peers of the channel keyed by organization;
//! layouts come from `endorsement.layouts`. Used where the network's
//! discovery service is not deployed.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ClientError, ClientResult};
use crate::transport::{ConnectionRegistry, DiscoveredEndorsers, Discovery, Layout};

#[derive(Debug, Clone)]
pub struct ConfiguredDiscovery {
    registry: Arc<ConnectionRegistry>,
    layouts: Vec<Layout>,
}

impl ConfiguredDiscovery {
    pub fn new(registry: Arc<ConnectionRegistry>, layouts: Vec<Layout>) -> Self {
        Self { registry, layouts }
    }
}

#[async_trait]
impl Discovery for ConfiguredDiscovery {
    async fn discover(
        &self,
        channel: &str,
        chaincodes: &[String],
    ) -> ClientResult<DiscoveredEndorsers> {
        if chaincodes.is_empty() {
            return Err(ClientError::Configuration(
                "discovery needs at least one chaincode".to_string(),
            ));
        }
        let groups = self.registry.peers_by_org(channel);
        tracing::debug!(
            channel = %channel,
            groups = groups.len(),
            layouts = self.layouts.len(),
            "Serving configured endorsement layouts"
        );
        Ok(DiscoveredEndorsers {
            groups,
            layouts: self.layouts.clone(),
        })
    }
}
