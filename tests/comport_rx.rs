mod common;

use common::{counter, hits, mock_port, wait_until};
use comport::PortEvent;

#[tokio::test]
async fn test_rx_queue_keeps_first_512_bytes_in_order() {
    let (port, backend) = mock_port();
    let (on_rx, rx_count) = counter();
    port.subscribe(PortEvent::RxData, on_rx);
    port.open().await.expect("open");

    let fed: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
    backend.feed(&fed);

    assert!(wait_until(|| hits(&rx_count) == 600).await, "every byte notifies");
    assert_eq!(port.rx_data_count(), 512);

    let stats = port.stats();
    assert_eq!(stats.rx_bytes, 600);
    assert_eq!(stats.rx_dropped, 88);

    let mut out = Vec::new();
    assert_eq!(port.rx_data(&mut out, 1000), 512);
    assert_eq!(out, fed[..512]);
    assert_eq!(port.rx_data_count(), 0);

    port.close().await;
}

#[tokio::test]
async fn test_rx_data_respects_max_count_and_order() {
    let (port, backend) = mock_port();
    port.open().await.expect("open");

    backend.feed(b"hello world");
    assert!(wait_until(|| port.rx_data_count() == 11).await);

    let mut out = Vec::new();
    assert_eq!(port.rx_data(&mut out, 0), 0);
    assert!(out.is_empty());

    assert_eq!(port.rx_data(&mut out, 5), 5);
    assert_eq!(out, b"hello");
    assert_eq!(port.rx_data_count(), 6);

    assert_eq!(port.rx_data(&mut out, 100), 6);
    assert_eq!(out, b"hello world");
    assert_eq!(port.rx_data(&mut out, 100), 0);

    port.close().await;
}

#[tokio::test]
async fn test_read_failure_shuts_link_down() {
    let (port, backend) = mock_port();
    let (on_shutdown, shutdowns) = counter();
    port.subscribe(PortEvent::Shutdown, on_shutdown);
    port.open().await.expect("open");

    backend.feed(b"ab");
    backend.fail_next_read();

    assert!(wait_until(|| hits(&shutdowns) == 1).await, "shutdown fires");
    assert!(!port.is_open());
    assert_eq!(backend.open_devices(), 0);
    assert_eq!(port.stats().worker_failures, 1);

    // Bytes read before the failure stay available until close.
    let mut out = Vec::new();
    port.rx_data(&mut out, 10);
    assert_eq!(out, b"ab");

    assert!(matches!(port.tx_data(vec![1]), Err(comport::ComPortError::PortClosed)));

    port.close().await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(hits(&shutdowns), 1, "shutdown fires once per session");
}

#[tokio::test]
async fn test_unsubscribed_callback_stops_firing() {
    let (port, backend) = mock_port();
    let (on_rx, rx_count) = counter();
    port.subscribe(PortEvent::RxData, on_rx.clone());
    port.open().await.expect("open");

    backend.feed(b"x");
    assert!(wait_until(|| hits(&rx_count) == 1).await);

    assert!(port.unsubscribe(PortEvent::RxData, &on_rx));
    backend.feed(b"yz");
    assert!(wait_until(|| port.rx_data_count() == 3).await);
    assert_eq!(hits(&rx_count), 1);

    port.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_while_streaming_leaves_rx_queue_empty() {
    let stream: Vec<u8> = (0..20_000u32).map(|i| i as u8).collect();
    for trial in 0..100 {
        let (port, backend) = mock_port();
        port.open().await.expect("open");
        backend.feed(&stream);
        tokio::time::sleep(std::time::Duration::from_micros(200)).await;

        let mut out = Vec::new();
        port.rx_data(&mut out, usize::MAX);
        port.close().await;
        assert_eq!(port.rx_data_count(), 0, "rx queue not empty after close (trial {})", trial);
    }
}
