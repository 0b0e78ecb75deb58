//! Status service: filtered listener, pump and watchdog for one channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::schema::WatchdogConfig;
use crate::error::ClientResult;
use crate::events::{
    BlockEventRecord, EventListener, ListenerFactory, ListenerHandle, StartPosition, Watchdog,
};
use crate::status::broker::{StatusBroker, TxStatus};
use crate::status::height::HeightTracker;
use crate::transport::ChainHeightSource;

const RECORD_BUFFER: usize = 256;

/// Restarts always reuse the same peer, output and parent token.
struct ListenerSpawner {
    listener: EventListener,
    output: mpsc::Sender<BlockEventRecord>,
    cancel: CancellationToken,
}

#[async_trait]
impl ListenerFactory for ListenerSpawner {
    async fn start(&self, position: StartPosition) -> ClientResult<ListenerHandle> {
        self.listener
            .start(position, self.output.clone(), self.cancel.child_token())
            .await
    }
}

pub struct StatusService {
    channel: String,
    listener: EventListener,
    broker: StatusBroker,
    chain: Arc<dyn ChainHeightSource>,
    watchdog: WatchdogConfig,
}

impl StatusService {
    pub fn new(
        channel: impl Into<String>,
        listener: EventListener,
        broker: StatusBroker,
        chain: Arc<dyn ChainHeightSource>,
        watchdog: WatchdogConfig,
    ) -> Self {
        Self {
            channel: channel.into(),
            listener,
            broker,
            chain,
            watchdog,
        }
    }

    /// Open the stream and spawn the pump (and watchdog when enabled).
    pub async fn start(
        self,
        start: StartPosition,
        shutdown: CancellationToken,
    ) -> ClientResult<StatusServiceHandle> {
        let token = shutdown.child_token();
        let initial = start.first_block().map(|n| n.saturating_sub(1)).unwrap_or(0);
        let tracker = HeightTracker::new(initial);
        let (output, records) = mpsc::channel(RECORD_BUFFER);

        let spawner = Arc::new(ListenerSpawner {
            listener: self.listener,
            output,
            cancel: token.clone(),
        });
        let listener = spawner.start(start).await?;

        let pump = tokio::spawn(pump(
            records,
            tracker.clone(),
            self.broker.clone(),
            token.clone(),
        ));

        let supervision = if self.watchdog.enabled {
            let watchdog = Watchdog::new(
                self.channel.clone(),
                Duration::from_secs(self.watchdog.interval_secs),
                self.watchdog.stall_threshold,
                Arc::new(tracker.clone()),
                self.chain,
                spawner,
            );
            Supervision::Watchdog(tokio::spawn(watchdog.run(listener, token.clone())))
        } else {
            tracing::info!(channel = %self.channel, "Watchdog disabled");
            Supervision::Unsupervised(listener)
        };

        tracing::info!(channel = %self.channel, "Status service started");
        Ok(StatusServiceHandle {
            shutdown: token,
            tracker,
            pump,
            supervision,
        })
    }
}

/// Feed the height tracker and the broker from delivered blocks.
async fn pump(
    mut records: mpsc::Receiver<BlockEventRecord>,
    tracker: HeightTracker,
    broker: StatusBroker,
    shutdown: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            record = records.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        if let Some(error) = &record.error {
            tracing::warn!(error = %error, "Skipping undecodable block");
            continue;
        }
        tracker.observe(record.number);

        for tx in &record.transactions {
            if tx.tx_id.is_empty() {
                continue;
            }
            let delivered = broker.publish(TxStatus {
                tx_id: tx.tx_id.clone(),
                validation_code: tx.validation_code,
                block_number: record.number,
            });
            if delivered {
                tracing::debug!(tx_id = %tx.tx_id, block = record.number, "Status delivered to waiter");
            }
        }
    }
}

#[derive(Debug)]
enum Supervision {
    Watchdog(JoinHandle<Option<ListenerHandle>>),
    Unsupervised(ListenerHandle),
}

#[derive(Debug)]
pub struct StatusServiceHandle {
    shutdown: CancellationToken,
    tracker: HeightTracker,
    pump: JoinHandle<()>,
    supervision: Supervision,
}

impl StatusServiceHandle {
    /// Last block number seen by the pump.
    pub fn height(&self) -> u64 {
        self.tracker.get()
    }

    /// Tear down the listener, then the pump.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let listener = match self.supervision {
            Supervision::Watchdog(task) => task.await.ok().flatten(),
            Supervision::Unsupervised(handle) => Some(handle),
        };
        if let Some(listener) = listener {
            listener.disconnect().await;
        }
        if let Err(e) = self.pump.await {
            tracing::warn!(error = %e, "Status pump task failed");
        }
        tracing::info!("Status service stopped");
    }
}
