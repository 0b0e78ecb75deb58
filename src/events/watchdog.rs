//! Reconnection Watchdog.
//!
//! # Responsibilities
//! - Compare the locally delivered height with the chain height on a fixed tick
//! - Count consecutive stalls; at the threshold tear the listener down
//! - Start the replacement from the last local height, then reset the count
//!
//! A chain height query failure skips the tick; it is neither a stall nor a
//! healthy observation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::ClientResult;
use crate::events::listener::{ListenerHandle, StartPosition};
use crate::observability::metrics;
use crate::transport::ChainHeightSource;

/// Height last delivered through the event stream.
pub trait LocalHeightSource: Send + Sync {
    fn local_height(&self) -> u64;
}

/// Starts a fresh listener; used for every forced reconnect.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn start(&self, position: StartPosition) -> ClientResult<ListenerHandle>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Healthy,
    /// Stall observed; carries the consecutive count.
    Stalled(u32),
    Reconnect,
}

/// Pure stall bookkeeping, one `observe` per tick.
#[derive(Debug, Clone)]
pub struct StallDetector {
    last_local: u64,
    stalls: u32,
    threshold: u32,
}

impl StallDetector {
    pub fn new(initial_local: u64, threshold: u32) -> Self {
        Self {
            last_local: initial_local,
            stalls: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn observe(&mut self, local: u64, chain: u64) -> WatchdogAction {
        let unchanged = local == self.last_local;
        self.last_local = local;

        if !unchanged || chain <= local.saturating_add(1) {
            self.stalls = 0;
            return WatchdogAction::Healthy;
        }

        self.stalls += 1;
        if self.stalls >= self.threshold {
            self.stalls = 0;
            WatchdogAction::Reconnect
        } else {
            WatchdogAction::Stalled(self.stalls)
        }
    }
}

pub struct Watchdog {
    channel: String,
    interval: Duration,
    threshold: u32,
    local: Arc<dyn LocalHeightSource>,
    chain: Arc<dyn ChainHeightSource>,
    factory: Arc<dyn ListenerFactory>,
}

impl Watchdog {
    pub fn new(
        channel: impl Into<String>,
        interval: Duration,
        threshold: u32,
        local: Arc<dyn LocalHeightSource>,
        chain: Arc<dyn ChainHeightSource>,
        factory: Arc<dyn ListenerFactory>,
    ) -> Self {
        Self {
            channel: channel.into(),
            interval,
            threshold,
            local,
            chain,
            factory,
        }
    }

    /// Supervise `handle` until `shutdown`; returns the listener alive at exit.
    ///
    /// The returned handle is `None` when the last restart attempt failed.
    pub async fn run(
        self,
        handle: ListenerHandle,
        shutdown: CancellationToken,
    ) -> Option<ListenerHandle> {
        tracing::info!(
            channel = %self.channel,
            interval_secs = self.interval.as_secs(),
            threshold = self.threshold,
            "Watchdog starting"
        );

        let mut current = Some(handle);
        let mut detector = StallDetector::new(self.local.local_height(), self.threshold);
        let mut ticker = time::interval(self.interval);
        // The first tick of `interval` fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(channel = %self.channel, "Watchdog received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    let local = self.local.local_height();
                    let chain = match self.chain.chain_height(&self.channel).await {
                        Ok(height) => height,
                        Err(e) => {
                            tracing::warn!(channel = %self.channel, error = %e, "Chain height unavailable, skipping tick");
                            continue;
                        }
                    };

                    match detector.observe(local, chain) {
                        WatchdogAction::Healthy => {}
                        WatchdogAction::Stalled(count) => {
                            tracing::warn!(channel = %self.channel, local, chain, stalls = count, "Event stream stalled");
                        }
                        WatchdogAction::Reconnect => {
                            current = self.reconnect(current.take(), local).await;
                        }
                    }
                }
            }
        }

        current
    }

    async fn reconnect(&self, previous: Option<ListenerHandle>, local: u64) -> Option<ListenerHandle> {
        tracing::warn!(channel = %self.channel, from_block = local, "Forcing event stream reconnect");
        metrics::record_reconnect();

        if let Some(previous) = previous {
            let exit = previous.disconnect().await;
            tracing::debug!(channel = %self.channel, exit = ?exit, "Previous listener torn down");
        }

        match self.factory.start(StartPosition::From(local)).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(channel = %self.channel, error = %e, "Listener restart failed");
                None
            }
        }
    }
}
