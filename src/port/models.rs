use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Events a caller can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortEvent {
    /// A byte arrived from the device (fired once per byte, even if the Rx queue dropped it)
    RxData,
    /// A worker hit a device failure; the connection is dead
    Shutdown,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Running link counters
#[derive(Debug, Default)]
pub struct PortStats {
    rx_bytes: AtomicU64,
    rx_dropped: AtomicU64,
    tx_frames: AtomicU64,
    tx_bytes: AtomicU64,
    tx_rejected: AtomicU64,
    worker_failures: AtomicU64,
}

impl PortStats {
    pub(crate) fn record_rx(&self, kept: bool) {
        self.rx_bytes.fetch_add(1, Ordering::Relaxed);
        if !kept {
            self.rx_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_tx(&self, len: usize) {
        self.tx_frames.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.tx_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_rejected: self.tx_rejected.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Bytes read from the device, including dropped ones
    pub rx_bytes: u64,
    /// Bytes discarded because the Rx queue was full
    pub rx_dropped: u64,
    /// Frames fully written to the device
    pub tx_frames: u64,
    pub tx_bytes: u64,
    /// `tx_data` calls refused with a full queue
    pub tx_rejected: u64,
    pub worker_failures: u64,
}
