#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use comport::{callback, Callback, ComPort, MockBackend, PortConfig};

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub fn mock_port() -> (ComPort, MockBackend) {
    let backend = MockBackend::new();
    let port = ComPort::new(PortConfig::default(), Arc::new(backend.clone()));
    (port, backend)
}

/// Callback that counts its invocations
pub fn counter() -> (Callback, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = count.clone();
    let handle = callback(move || {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    (handle, count)
}

pub fn hits(count: &AtomicUsize) -> usize {
    count.load(Ordering::SeqCst)
}
