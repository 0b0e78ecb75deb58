//! gRPC transports over tonic channels.
//!
//! Services are called by path with a prost codec; the messages are the
//! hand-declared ones in `crate::protos`.

use std::fs;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use url::Url;

use crate::config::schema::TlsConfig;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::protos::common::Envelope;
use crate::protos::orderer::BroadcastResponse;
use crate::protos::peer::{DeliverResponse, ProposalResponse, SignedProposal};
use crate::transport::{DeliverKind, DeliverSource, DeliverStream, Endorser, Orderer};

const PROCESS_PROPOSAL: &str = "/protos.Endorser/ProcessProposal";
const BROADCAST: &str = "/orderer.AtomicBroadcast/Broadcast";
const DELIVER: &str = "/protos.Deliver/Deliver";
const DELIVER_FILTERED: &str = "/protos.Deliver/DeliverFiltered";

/// Build a lazily connecting channel for `url`.
pub fn lazy_channel(
    url: &str,
    tls: Option<&TlsConfig>,
    connect_timeout: Duration,
) -> ClientResult<Channel> {
    Ok(endpoint(url, tls, connect_timeout)?.connect_lazy())
}

/// Endpoint for `url`.
///
/// `grpcs://` and `https://` (or an explicit TLS section) select TLS.
pub fn endpoint(
    url: &str,
    tls: Option<&TlsConfig>,
    connect_timeout: Duration,
) -> ClientResult<Endpoint> {
    let parsed = Url::parse(url)
        .map_err(|e| ClientError::Configuration(format!("Invalid endpoint URL '{}': {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ClientError::Configuration(format!("Endpoint '{}' has no host", url)))?;
    let port = parsed
        .port()
        .ok_or_else(|| ClientError::Configuration(format!("Endpoint '{}' has no port", url)))?;
    let secure = tls.is_some() || matches!(parsed.scheme(), "grpcs" | "https");
    let scheme = if secure { "https" } else { "http" };

    let mut endpoint = Endpoint::from_shared(format!("{}://{}:{}", scheme, host, port))
        .map_err(|e| ClientError::Configuration(format!("Invalid endpoint '{}': {}", url, e)))?
        .connect_timeout(connect_timeout)
        .tcp_nodelay(true);

    if let Some(tls) = tls {
        let ca = fs::read(&tls.ca_path).map_err(|e| {
            ClientError::Configuration(format!("cannot read CA '{}': {}", tls.ca_path, e))
        })?;
        let mut tls_config = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca));
        let domain = tls.server_name.clone().unwrap_or_else(|| host.to_string());
        tls_config = tls_config.domain_name(domain);
        endpoint = endpoint
            .tls_config(tls_config)
            .map_err(|e| ClientError::Configuration(format!("TLS setup for '{}': {}", url, e)))?;
    }

    Ok(endpoint)
}

async fn ready(channel: Channel) -> Result<tonic::client::Grpc<Channel>, TransportError> {
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| TransportError::Unavailable(e.to_string()))?;
    Ok(grpc)
}

/// `protos.Endorser` client.
#[derive(Debug, Clone)]
pub struct GrpcEndorser {
    channel: Channel,
}

impl GrpcEndorser {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Endorser for GrpcEndorser {
    async fn process_proposal(
        &self,
        proposal: &SignedProposal,
    ) -> Result<ProposalResponse, TransportError> {
        let mut grpc = ready(self.channel.clone()).await?;
        let codec: ProstCodec<SignedProposal, ProposalResponse> = ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(proposal.clone()),
                PathAndQuery::from_static(PROCESS_PROPOSAL),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }
}

/// `orderer.AtomicBroadcast` client.
#[derive(Debug, Clone)]
pub struct GrpcOrderer {
    endpoint: Endpoint,
    channel: Channel,
}

impl GrpcOrderer {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            channel: endpoint.connect_lazy(),
            endpoint,
        }
    }
}

#[async_trait]
impl Orderer for GrpcOrderer {
    async fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastResponse, TransportError> {
        let mut grpc = ready(self.channel.clone()).await?;
        let codec: ProstCodec<Envelope, BroadcastResponse> = ProstCodec::default();
        let request = tonic::Request::new(stream::iter(vec![envelope.clone()]));
        let mut responses = grpc
            .streaming(request, PathAndQuery::from_static(BROADCAST), codec)
            .await?
            .into_inner();

        match responses.message().await? {
            Some(response) => Ok(response),
            None => Err(TransportError::Unavailable(
                "broadcast stream closed without a response".to_string(),
            )),
        }
    }

    async fn check_connection(&self) -> Result<(), TransportError> {
        // The shared channel is lazy; a dedicated connect reports the real state.
        self.endpoint
            .connect()
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }
}

/// `protos.Deliver` client.
#[derive(Debug, Clone)]
pub struct GrpcDeliver {
    channel: Channel,
}

impl GrpcDeliver {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl DeliverSource for GrpcDeliver {
    async fn deliver(
        &self,
        kind: DeliverKind,
        seek: Envelope,
    ) -> Result<DeliverStream, TransportError> {
        let mut grpc = ready(self.channel.clone()).await?;
        let codec: ProstCodec<Envelope, DeliverResponse> = ProstCodec::default();
        let path = match kind {
            DeliverKind::Full => DELIVER,
            DeliverKind::Filtered => DELIVER_FILTERED,
        };
        // Half-closing the request side would end the session on the peer.
        let outbound = stream::iter(vec![seek]).chain(stream::pending());
        let inbound = grpc
            .streaming(
                tonic::Request::new(outbound),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?
            .into_inner();

        Ok(inbound.map(|item| item.map_err(TransportError::from)).boxed())
    }
}
