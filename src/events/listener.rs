//! Event Stream Listener.
//!
//! One listener owns one deliver stream to one event peer. `start` runs
//! `Connecting` and `Registered` inline so connection failures surface to
//! the caller. The peer accepts a registration by answering it: the first
//! deliver response (block or status) moves the listener to `Streaming`.
//! The receive loop runs in a spawned task until cancellation, end-of-stream
//! or a transport error, after which the listener is `Disconnected` for good.

use std::str::FromStr;
use std::sync::Arc;

use futures_util::StreamExt;
use prost::Message;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::crypto::{CryptoSuite, Identity};
use crate::error::{ClientError, ClientResult};
use crate::events::decoder::{decode_deliver_response, now_ms, DeliverEvent};
use crate::events::types::BlockEventRecord;
use crate::observability::metrics;
use crate::proposal::header;
use crate::protos::common::{Envelope, HeaderType, Status};
use crate::protos::orderer::{SeekBehavior, SeekInfo, SeekPosition};
use crate::transport::{DeliverKind, DeliverSource, DeliverStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Registered,
    Streaming,
}

/// Where delivery starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Newest,
    Oldest,
    /// From this block number to the end of the chain.
    From(u64),
    /// Blocks `start..=stop`; the stream ends after `stop`.
    Range { start: u64, stop: u64 },
}

impl StartPosition {
    /// Bound the position with a last block.
    pub fn until(self, stop: u64) -> ClientResult<Self> {
        let start = match self {
            StartPosition::Oldest => 0,
            StartPosition::From(start) | StartPosition::Range { start, .. } => start,
            StartPosition::Newest => {
                return Err(ClientError::Configuration(
                    "a stop block needs an explicit start".to_string(),
                ))
            }
        };
        if stop < start {
            return Err(ClientError::Configuration(format!(
                "stop block {} precedes start block {}",
                stop, start
            )));
        }
        Ok(StartPosition::Range { start, stop })
    }

    /// First block a listener started here asks for, when known.
    pub fn first_block(&self) -> Option<u64> {
        match self {
            StartPosition::Oldest => Some(0),
            StartPosition::From(start) | StartPosition::Range { start, .. } => Some(*start),
            StartPosition::Newest => None,
        }
    }
}

/// `newest`, `oldest` or a block number; negative numbers mean newest.
impl FromStr for StartPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(StartPosition::Newest),
            "oldest" => Ok(StartPosition::Oldest),
            other => other
                .parse::<i64>()
                .map(|h| match u64::try_from(h) {
                    Ok(number) => StartPosition::From(number),
                    Err(_) => StartPosition::Newest,
                })
                .map_err(|_| format!("expected 'newest', 'oldest' or a block number, got '{}'", s)),
        }
    }
}

/// Why a streaming task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    Cancelled,
    EndOfStream,
    /// The record receiver was dropped.
    OutputClosed,
    Failed(String),
}

/// Configuration of one listener; cheap to clone for restarts.
#[derive(Clone)]
pub struct EventListener {
    peer: String,
    channel: String,
    kind: DeliverKind,
    source: Arc<dyn DeliverSource>,
    identity: Arc<Identity>,
    suite: Arc<dyn CryptoSuite>,
}

impl EventListener {
    pub fn new(
        peer: impl Into<String>,
        channel: impl Into<String>,
        kind: DeliverKind,
        source: Arc<dyn DeliverSource>,
        identity: Arc<Identity>,
        suite: Arc<dyn CryptoSuite>,
    ) -> Self {
        Self {
            peer: peer.into(),
            channel: channel.into(),
            kind,
            source,
            identity,
            suite,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Signed `DELIVER_SEEK_INFO` envelope for `start`.
    pub fn seek_envelope(&self, start: StartPosition) -> ClientResult<Envelope> {
        let (start, stop) = match start {
            StartPosition::Newest => (SeekPosition::newest(), u64::MAX),
            StartPosition::Oldest => (SeekPosition::oldest(), u64::MAX),
            StartPosition::From(number) => (SeekPosition::specified(number), u64::MAX),
            StartPosition::Range { start, stop } => (SeekPosition::specified(start), stop),
        };
        let seek_info = SeekInfo {
            start: Some(start),
            stop: Some(SeekPosition::specified(stop)),
            behavior: SeekBehavior::BlockUntilReady as i32,
        };

        let creator = self.identity.creator()?;
        let nonce = header::new_nonce();
        let tx_id = header::compute_tx_id(self.suite.as_ref(), &nonce, &creator);
        let channel_header =
            header::channel_header(HeaderType::DeliverSeekInfo, &self.channel, &tx_id, Vec::new());
        let signature_header = header::signature_header(&creator, &nonce);

        header::signed_envelope(
            header::header(&channel_header, &signature_header),
            seek_info.encode_to_vec(),
            &self.identity,
            self.suite.as_ref(),
        )
    }

    /// Connect, register and spawn the receive loop.
    ///
    /// Records go to `output`; cancelling `cancel` tears the stream down.
    pub async fn start(
        &self,
        start: StartPosition,
        output: mpsc::Sender<BlockEventRecord>,
        cancel: CancellationToken,
    ) -> ClientResult<ListenerHandle> {
        let (state_tx, state_rx) = watch::channel(ListenerState::Disconnected);

        let seek = self.seek_envelope(start)?;
        state_tx.send_replace(ListenerState::Connecting);
        tracing::info!(
            peer = %self.peer,
            channel = %self.channel,
            kind = ?self.kind,
            start = ?start,
            "Event listener connecting"
        );

        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                state_tx.send_replace(ListenerState::Disconnected);
                return Err(ClientError::StreamTransport("cancelled while connecting".to_string()));
            }
            opened = self.source.deliver(self.kind, seek) => opened,
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                state_tx.send_replace(ListenerState::Disconnected);
                tracing::warn!(peer = %self.peer, error = %e, "Event stream registration failed");
                return Err(ClientError::StreamTransport(e.to_string()));
            }
        };
        state_tx.send_replace(ListenerState::Registered);

        let task = tokio::spawn(receive_loop(
            self.peer.clone(),
            self.channel.clone(),
            stream,
            output,
            cancel.clone(),
            state_tx,
        ));

        Ok(ListenerHandle {
            cancel,
            state: state_rx,
            task,
        })
    }
}

async fn receive_loop(
    peer: String,
    channel: String,
    mut stream: DeliverStream,
    output: mpsc::Sender<BlockEventRecord>,
    cancel: CancellationToken,
    state: watch::Sender<ListenerState>,
) -> ListenerExit {
    let mut accepted = false;
    let exit = loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break ListenerExit::Cancelled,
            item = stream.next() => item,
        };

        let response = match item {
            None => break ListenerExit::EndOfStream,
            Some(Err(e)) => break ListenerExit::Failed(e.to_string()),
            Some(Ok(response)) => response,
        };
        if !accepted {
            accepted = true;
            state.send_replace(ListenerState::Streaming);
            tracing::debug!(peer = %peer, channel = %channel, "Registration accepted");
        }

        match decode_deliver_response(response, now_ms()) {
            DeliverEvent::Record(record) => {
                if !record.is_error() {
                    metrics::record_block(&channel, record.number);
                }
                tracing::debug!(
                    peer = %peer,
                    block = record.number,
                    transactions = record.transactions.len(),
                    "Block received"
                );
                if cancel.is_cancelled() {
                    break ListenerExit::Cancelled;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break ListenerExit::Cancelled,
                    sent = output.send(record) => {
                        if sent.is_err() {
                            break ListenerExit::OutputClosed;
                        }
                    }
                }
            }
            DeliverEvent::Status(status) if status == Status::Success as i32 => {
                break ListenerExit::EndOfStream;
            }
            DeliverEvent::Status(status) => {
                break ListenerExit::Failed(format!("deliver ended with status {}", status));
            }
            DeliverEvent::Empty => {}
        }
    };

    // Dropping the stream closes the connection.
    drop(stream);
    state.send_replace(ListenerState::Disconnected);

    match &exit {
        ListenerExit::Failed(reason) => {
            tracing::warn!(peer = %peer, channel = %channel, reason = %reason, "Event stream dropped")
        }
        other => tracing::info!(peer = %peer, channel = %channel, exit = ?other, "Event listener stopped"),
    }
    exit
}

/// Owner's grip on a running listener.
#[derive(Debug)]
pub struct ListenerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<ListenerState>,
    task: JoinHandle<ListenerExit>,
}

impl ListenerHandle {
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Request teardown without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait until the stream is closed.
    pub async fn disconnect(self) -> ListenerExit {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the listener to stop on its own.
    pub async fn join(self) -> ListenerExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => ListenerExit::Failed(format!("listener task aborted: {}", e)),
        }
    }
}
