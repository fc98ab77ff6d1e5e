use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::serial::CompletionSignal;
use crate::util::lock;

/// Bounded FIFO of received bytes
#[derive(Debug)]
pub struct RxQueue {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl RxQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a byte; returns false when the queue is full and the byte was dropped
    pub fn push(&mut self, byte: u8) -> bool {
        if self.bytes.len() >= self.capacity {
            return false;
        }
        self.bytes.push_back(byte);
        true
    }

    /// Move up to `max` bytes, oldest first, onto the end of `out`
    pub fn drain_into(&mut self, out: &mut Vec<u8>, max: usize) -> usize {
        let count = max.min(self.bytes.len());
        out.extend(self.bytes.drain(..count));
        count
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// One outbound buffer together with the completion signal its write waits on
#[derive(Debug)]
pub struct PendingFrame {
    pub data: Vec<u8>,
    pub signal: CompletionSignal,
}

impl PendingFrame {
    pub fn new(data: Vec<u8>, signal: CompletionSignal) -> Self {
        Self { data, signal }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Bounded FIFO of pending frames with a shared byte budget.
///
/// `bytes_in_flight` counts bytes of frames still queued; it drops when the
/// Tx worker takes a frame, not when the write finishes.
#[derive(Debug)]
pub struct TxQueue {
    frames: VecDeque<PendingFrame>,
    bytes_in_flight: usize,
    max_frames: usize,
    max_bytes: usize,
}

impl TxQueue {
    pub fn new(max_frames: usize, max_bytes: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(max_frames),
            bytes_in_flight: 0,
            max_frames,
            max_bytes,
        }
    }

    /// Admission test for a frame of `len` bytes.
    ///
    /// The byte check is strict: a frame exactly filling the remaining
    /// budget is refused.
    pub fn has_room(&self, len: usize) -> bool {
        let remaining = self.max_bytes.saturating_sub(self.bytes_in_flight);
        self.frames.len() < self.max_frames && len < remaining
    }

    /// Admit a frame. Callers check [`TxQueue::has_room`] under the same lock.
    pub fn push(&mut self, frame: PendingFrame) {
        debug_assert!(self.has_room(frame.len()));
        self.bytes_in_flight += frame.len();
        self.frames.push_back(frame);
    }

    pub fn pop(&mut self) -> Option<PendingFrame> {
        let frame = self.frames.pop_front()?;
        self.bytes_in_flight -= frame.len();
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.bytes_in_flight = 0;
    }
}

/// Edge-triggered wake for the Tx worker.
///
/// `pending` records an outstanding, unconsumed wake. Producers notify only
/// on the false -> true edge; the worker clears the marker after waking and
/// then re-checks the queue, so an extra wake is harmless and none is lost
/// (`Notify` keeps a permit when nobody is waiting yet).
#[derive(Debug, Default)]
pub struct TxWake {
    pending: Mutex<bool>,
    notify: Notify,
}

impl TxWake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record work for the worker
    pub fn raise(&self) {
        let mut pending = lock(&self.pending);
        if !*pending {
            self.notify.notify_one();
        }
        *pending = true;
    }

    /// Unblock a waiting worker once, leaving no wake outstanding
    pub fn release(&self) {
        let mut pending = lock(&self.pending);
        if !*pending {
            self.notify.notify_one();
        }
        *pending = false;
    }

    /// Block until a wake is outstanding
    pub async fn wait(&self) {
        let outstanding = *lock(&self.pending);
        if !outstanding {
            self.notify.notified().await;
        }
    }

    /// Consume the outstanding wake
    pub fn clear(&self) {
        *lock(&self.pending) = false;
    }

    pub fn is_pending(&self) -> bool {
        *lock(&self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(len: usize) -> PendingFrame {
        PendingFrame::new(vec![0xA5; len], CompletionSignal::new())
    }

    #[test]
    fn test_rx_queue_drops_when_full() {
        let mut queue = RxQueue::new(4);
        for byte in 0..6u8 {
            queue.push(byte);
        }
        assert_eq!(queue.len(), 4);

        let mut out = Vec::new();
        assert_eq!(queue.drain_into(&mut out, 10), 4);
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rx_drain_respects_max_and_appends() {
        let mut queue = RxQueue::new(16);
        for byte in b"abcdef" {
            queue.push(*byte);
        }
        let mut out = vec![b'>'];
        assert_eq!(queue.drain_into(&mut out, 2), 2);
        assert_eq!(out, b">ab");
        assert_eq!(queue.drain_into(&mut out, 0), 0);
        assert_eq!(queue.drain_into(&mut out, 3), 3);
        assert_eq!(out, b">abcde");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_tx_frame_count_limit() {
        let mut queue = TxQueue::new(5, 512);
        for _ in 0..5 {
            assert!(queue.has_room(100));
            queue.push(frame(100));
        }
        assert_eq!(queue.bytes_in_flight(), 500);
        assert!(!queue.has_room(0));
    }

    #[test]
    fn test_tx_byte_budget_boundary_is_strict() {
        let mut queue = TxQueue::new(5, 512);
        assert!(!queue.has_room(512));
        assert!(queue.has_room(511));
        queue.push(frame(511));
        // One byte of budget is left but a one-byte frame needs 1 < 1.
        assert!(!queue.has_room(1));
        assert!(queue.has_room(0));
    }

    #[test]
    fn test_tx_pop_is_fifo_and_releases_budget() {
        let mut queue = TxQueue::new(5, 512);
        queue.push(PendingFrame::new(vec![1; 10], CompletionSignal::new()));
        queue.push(PendingFrame::new(vec![2; 20], CompletionSignal::new()));
        assert_eq!(queue.bytes_in_flight(), 30);

        let first = queue.pop().expect("first frame");
        assert_eq!(first.data, vec![1; 10]);
        assert_eq!(queue.bytes_in_flight(), 20);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.bytes_in_flight(), 0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_concurrent_admission_rejects_exactly_the_excess() {
        let queue = Arc::new(Mutex::new(TxQueue::new(5, 512)));
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let mut queue = lock(&queue);
                    if queue.has_room(100) {
                        queue.push(frame(100));
                        true
                    } else {
                        false
                    }
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
        assert_eq!(lock(&queue).bytes_in_flight(), 500);
    }

    #[tokio::test]
    async fn test_wake_raised_before_wait_is_not_lost() {
        let wake = TxWake::new();
        wake.raise();
        wake.raise();
        assert!(wake.is_pending());
        tokio::time::timeout(Duration::from_millis(100), wake.wait())
            .await
            .expect("outstanding wake returns immediately");
        wake.clear();
        assert!(!wake.is_pending());
    }

    #[tokio::test]
    async fn test_release_unblocks_waiting_worker() {
        let wake = Arc::new(TxWake::new());
        let waiter = {
            let wake = wake.clone();
            tokio::spawn(async move { wake.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        wake.release();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("worker released")
            .expect("task");
        assert!(!wake.is_pending());
    }
}
