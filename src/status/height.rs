//! Last block number delivered through the event stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::events::LocalHeightSource;

#[derive(Debug, Clone, Default)]
pub struct HeightTracker {
    height: Arc<AtomicU64>,
}

impl HeightTracker {
    pub fn new(initial: u64) -> Self {
        Self {
            height: Arc::new(AtomicU64::new(initial)),
        }
    }

    /// Record a delivered block. Replays after a reconnect never move it back.
    pub fn observe(&self, block_number: u64) {
        self.height.fetch_max(block_number, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }
}

impl LocalHeightSource for HeightTracker {
    fn local_height(&self) -> u64 {
        self.get()
    }
}
