//! Client context.
//!
//! Owns everything the pipelines share: configuration, connection registry,
//! identity, signing suite, endorsement strategy and status broker. Nothing
//! lives in module-level state, so independent clients coexist in one
//! process.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::schema::EndorsementMode;
use crate::config::validation::validate_config;
use crate::config::{ClientConfig, ConfigError};
use crate::crypto::{self, CryptoSuite, Identity};
use crate::endorsement::{ConfiguredDiscovery, EndorsementCollector, EndorsementStrategy, GroupSelector};
use crate::error::{ClientError, ClientResult};
use crate::events::{BlockEventRecord, EventListener, ListenerHandle, StartPosition, TransactionRecord};
use crate::proposal::{ChaincodeInvocation, ProposalBuilder};
use crate::protos::common::Envelope;
use crate::query::{ChainInfo, QueryClient};
use crate::status::{StatusBroker, StatusService, StatusServiceHandle, TxStatus};
use crate::transaction::{assemble_transaction, Broadcaster, OrdererHealth, SubmitResult};
use crate::transport::{ConnectionRegistry, DeliverKind, Discovery};

/// Result of a submit-and-wait.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub submit: SubmitResult,
    /// `None` when the ordering service refused the transaction, since it
    /// can then never commit.
    pub status: Option<TxStatus>,
}

impl CommitOutcome {
    pub fn is_committed_valid(&self) -> bool {
        self.status.as_ref().map(TxStatus::is_valid).unwrap_or(false)
    }
}

pub struct FabricClient {
    config: ClientConfig,
    registry: Arc<ConnectionRegistry>,
    identity: Arc<Identity>,
    suite: Arc<dyn CryptoSuite>,
    selector: GroupSelector,
    collector: EndorsementCollector,
    broadcaster: Broadcaster,
    broker: StatusBroker,
    queries: QueryClient,
    sync_wait: Duration,
}

impl FabricClient {
    /// Validate `config`, load the identity from disk and build lazy gRPC
    /// handles. Performs no network I/O.
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let suite = crypto::suite_for(&config.crypto.family)?;
        let identity = Identity::from_pem_files(
            &config.identity.msp_id,
            Path::new(&config.identity.cert_path),
            Path::new(&config.identity.key_path),
        )?;
        let registry = Arc::new(ConnectionRegistry::from_config(&config)?);
        Ok(Self::new(config, registry, identity, suite))
    }

    /// Assemble a client from parts; the endorsement strategy follows
    /// `config.endorsement.mode`.
    pub fn new(
        config: ClientConfig,
        registry: Arc<ConnectionRegistry>,
        identity: Identity,
        suite: Arc<dyn CryptoSuite>,
    ) -> Self {
        let strategy = match config.endorsement.mode {
            EndorsementMode::Static => EndorsementStrategy::Static {
                orgs: config.endorsement.orgs.clone(),
                rule: config.endorsement.rule,
            },
            EndorsementMode::Discovery => EndorsementStrategy::Discovery(Arc::new(
                ConfiguredDiscovery::new(registry.clone(), config.endorsement.layouts.clone()),
            )),
        };
        let identity = Arc::new(identity);
        let timeouts = &config.timeouts;
        let queries = QueryClient::new(
            registry.clone(),
            identity.clone(),
            suite.clone(),
            Duration::from_secs(timeouts.proposal_secs),
        );

        Self {
            selector: GroupSelector::new(strategy),
            collector: EndorsementCollector::new(Duration::from_secs(timeouts.proposal_secs)),
            broadcaster: Broadcaster::new(Duration::from_secs(timeouts.broadcast_secs)),
            broker: StatusBroker::new(),
            sync_wait: Duration::from_secs(timeouts.sync_wait_secs),
            queries,
            registry,
            identity,
            suite,
            config,
        }
    }

    /// Replace the endorsement strategy with an external discovery source.
    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.selector = GroupSelector::new(EndorsementStrategy::Discovery(discovery));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &StatusBroker {
        &self.broker
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    /// Invocation on the configured default channel and chaincode.
    pub fn default_invocation<I, A>(&self, args: I) -> ChaincodeInvocation
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        let channel = &self.config.channel;
        let invocation = ChaincodeInvocation::new(&channel.name, &channel.chaincode).with_args(args);
        match &channel.chaincode_version {
            Some(version) => invocation.with_version(version),
            None => invocation,
        }
    }

    /// Build, endorse and assemble; returns the transaction id and envelope.
    async fn endorse(&self, invocation: &ChaincodeInvocation) -> ClientResult<(String, Envelope)> {
        invocation.validate()?;
        let signed = ProposalBuilder::new(&self.identity, self.suite.as_ref()).build_signed(invocation)?;
        let plan = self
            .selector
            .select(&self.registry, &invocation.channel, &invocation.chaincode)
            .await?;
        let responses = self.collector.endorse(&signed.wire, &plan).await?;
        let envelope = assemble_transaction(&signed.proposal, &responses, &self.identity, self.suite.as_ref())?;

        tracing::info!(
            tx_id = %signed.tx_id(),
            channel = %invocation.channel,
            chaincode = %invocation.chaincode,
            endorsements = responses.len(),
            "Proposal endorsed"
        );
        Ok((signed.proposal.tx_id, envelope))
    }

    async fn broadcast(&self, channel: &str, tx_id: &str, envelope: &Envelope) -> ClientResult<SubmitResult> {
        let orderers = self.registry.orderers(channel);
        self.broadcaster.broadcast(channel, &orderers, envelope, tx_id).await
    }

    /// Endorse and submit. The result acknowledges ordering, not commitment.
    pub async fn invoke(&self, invocation: &ChaincodeInvocation) -> ClientResult<SubmitResult> {
        let result = async {
            let (tx_id, envelope) = self.endorse(invocation).await?;
            self.broadcast(&invocation.channel, &tx_id, &envelope).await
        }
        .await;

        if let Err(e) = &result {
            tracing::error!(channel = %invocation.channel, chaincode = %invocation.chaincode, error = %e, "Invoke failed");
        }
        result
    }

    /// Endorse, submit and wait up to the configured ceiling for the commit
    /// status. Needs a running status service on the channel.
    pub async fn invoke_and_wait(&self, invocation: &ChaincodeInvocation) -> ClientResult<CommitOutcome> {
        self.invoke_and_wait_for(invocation, self.sync_wait).await
    }

    pub async fn invoke_and_wait_for(
        &self,
        invocation: &ChaincodeInvocation,
        limit: Duration,
    ) -> ClientResult<CommitOutcome> {
        let (tx_id, envelope) = self.endorse(invocation).await?;

        // Registered before broadcast so a fast commit is never missed.
        let mut waiter = self.broker.register(&tx_id)?;
        let submit = self.broadcast(&invocation.channel, &tx_id, &envelope).await?;
        if !submit.is_success() {
            tracing::warn!(tx_id = %tx_id, status = %submit.status_name(), "Ordering service refused transaction");
            return Ok(CommitOutcome { submit, status: None });
        }

        match waiter.wait(limit).await {
            Ok(status) => {
                tracing::info!(
                    tx_id = %tx_id,
                    block = status.block_number,
                    validation = %status.validation_name(),
                    "Transaction committed"
                );
                Ok(CommitOutcome {
                    submit,
                    status: Some(status),
                })
            }
            Err(e) => {
                tracing::error!(tx_id = %tx_id, error = %e, "Commit status not observed");
                Err(e)
            }
        }
    }

    /// Evaluate without ordering; returns the chaincode's response payload.
    pub async fn query(&self, invocation: &ChaincodeInvocation) -> ClientResult<Vec<u8>> {
        self.queries.query(invocation).await
    }

    pub async fn chain_height(&self, channel: &str) -> ClientResult<u64> {
        self.queries.chain_height(channel).await
    }

    /// Height and head hashes of `channel`.
    pub async fn chain_info(&self, channel: &str) -> ClientResult<ChainInfo> {
        self.queries.chain_info(channel).await
    }

    /// Connectivity of every ordering node of `channel`. Submits nothing.
    pub async fn check_orderers(&self, channel: &str) -> ClientResult<Vec<OrdererHealth>> {
        let orderers = self.registry.orderers(channel);
        if orderers.is_empty() {
            return Err(ClientError::OrdererUnavailable {
                channel: channel.to_string(),
                attempted: 0,
            });
        }
        let health = self.broadcaster.check_connections(&orderers).await;
        tracing::info!(
            channel = %channel,
            orderers = health.len(),
            connected = health.iter().filter(|h| h.connected).count(),
            "Orderer connectivity checked"
        );
        Ok(health)
    }

    pub async fn block_by_number(&self, channel: &str, number: u64) -> ClientResult<BlockEventRecord> {
        self.queries.block_by_number(channel, number).await
    }

    pub async fn transaction_by_id(&self, channel: &str, tx_id: &str) -> ClientResult<TransactionRecord> {
        self.queries.transaction_by_id(channel, tx_id).await
    }

    /// Listener bound to an event peer of `channel`: the named one, or the
    /// first configured.
    pub fn event_listener(
        &self,
        channel: &str,
        peer: Option<&str>,
        kind: DeliverKind,
    ) -> ClientResult<EventListener> {
        let event_peer = match peer {
            Some(name) => self.registry.event_peer_named(channel, name).ok_or_else(|| {
                ClientError::NoAvailablePeer(format!(
                    "event peer '{}' is not configured for channel '{}'",
                    name, channel
                ))
            })?,
            None => self.registry.event_peer(channel).ok_or_else(|| {
                ClientError::NoAvailablePeer(format!("no event peer configured for channel '{}'", channel))
            })?,
        };
        Ok(EventListener::new(
            event_peer.name,
            channel,
            kind,
            event_peer.source,
            self.identity.clone(),
            self.suite.clone(),
        ))
    }

    /// Stream decoded blocks of `channel` into `output` until `cancel`.
    pub async fn listen(
        &self,
        channel: &str,
        peer: Option<&str>,
        kind: DeliverKind,
        start: StartPosition,
        output: mpsc::Sender<BlockEventRecord>,
        cancel: CancellationToken,
    ) -> ClientResult<ListenerHandle> {
        self.event_listener(channel, peer, kind)?.start(start, output, cancel).await
    }

    /// Start the filtered listener, status pump and watchdog feeding this
    /// client's broker.
    pub async fn start_status_service(
        &self,
        channel: &str,
        shutdown: CancellationToken,
    ) -> ClientResult<StatusServiceHandle> {
        let listener = self.event_listener(channel, None, DeliverKind::Filtered)?;
        StatusService::new(
            channel,
            listener,
            self.broker.clone(),
            Arc::new(self.queries.clone()),
            self.config.watchdog.clone(),
        )
        .start(StartPosition::Newest, shutdown)
        .await
    }
}
