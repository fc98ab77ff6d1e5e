//! Echo every byte received on a serial port back to the sender.
//!
//! Usage: `comport-echo <port-number | config.json>` or `comport-echo --list`.
//! Received bytes are printed in hex. The session ends when the peer sends
//! `END` or the link shuts down.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use comport::{callback, ComPort, LinkConfig, NativeBackend, PortConfig, PortEvent};

const TERMINATOR: &[u8] = b"END";
const READ_CHUNK: usize = 64;

fn load_config(arg: &str) -> Result<LinkConfig> {
    if let Ok(port_number) = arg.parse::<u8>() {
        if port_number == 0 {
            bail!("port number must be positive");
        }
        return Ok(LinkConfig {
            port: PortConfig {
                port_number,
                ..PortConfig::default()
            },
            ..LinkConfig::default()
        });
    }
    LinkConfig::load(arg).with_context(|| format!("Failed to load configuration from {}", arg))
}

fn list_ports() -> Result<()> {
    let ports = NativeBackend::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{} [{:04X}:{:04X}] {}",
                port.port_name,
                vid,
                pid,
                port.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

/// Tracks how much of [`TERMINATOR`] the stream currently ends with
struct TerminatorMatch {
    matched: usize,
}

impl TerminatorMatch {
    fn feed(&mut self, byte: u8) -> bool {
        if byte == TERMINATOR[self.matched] {
            self.matched += 1;
        } else {
            self.matched = usize::from(byte == TERMINATOR[0]);
        }
        self.matched == TERMINATOR.len()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let arg = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => bail!("usage: comport-echo <port-number | config.json> | --list"),
    };
    if arg == "--list" {
        return list_ports();
    }

    let config = load_config(&arg)?;
    let port = ComPort::from_link_config(config, Arc::new(NativeBackend::new()));

    let wake = Arc::new(Notify::new());
    let shut_down = Arc::new(AtomicBool::new(false));
    {
        let wake = wake.clone();
        port.subscribe(PortEvent::RxData, callback(move || wake.notify_one()));
    }
    {
        let wake = wake.clone();
        let shut_down = shut_down.clone();
        port.subscribe(
            PortEvent::Shutdown,
            callback(move || {
                shut_down.store(true, Ordering::SeqCst);
                wake.notify_one();
            }),
        );
    }

    port.open()
        .await
        .with_context(|| format!("Failed to open port {}", config.port.port_number))?;
    println!(
        "Echoing on port {} ({}), send END to stop",
        config.port.port_number,
        config.port.line_summary()
    );

    let mut terminator = TerminatorMatch { matched: 0 };
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    'echo: loop {
        wake.notified().await;
        if shut_down.load(Ordering::SeqCst) {
            println!("Link shut down");
            break;
        }

        loop {
            buffer.clear();
            if port.rx_data(&mut buffer, READ_CHUNK) == 0 {
                break;
            }
            let hex: Vec<String> = buffer.iter().map(|b| format!("{:02X}", b)).collect();
            println!("<- {}", hex.join(" "));

            if let Err(e) = port.tx_data(buffer.clone()) {
                eprintln!("Echo dropped: {}", e);
            }
            if buffer.iter().any(|&b| terminator.feed(b)) {
                println!("Terminator received");
                break 'echo;
            }
        }
    }

    let stats = port.stats();
    port.close().await;
    println!(
        "Received {} bytes ({} dropped), sent {} frames",
        stats.rx_bytes, stats.rx_dropped, stats.tx_frames
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_split_across_chunks() {
        let mut terminator = TerminatorMatch { matched: 0 };
        assert!(!b"xxEN".iter().any(|&b| terminator.feed(b)));
        assert!(b"Dyy".iter().any(|&b| terminator.feed(b)));
    }

    #[test]
    fn test_terminator_restarts_on_repeated_prefix() {
        let mut terminator = TerminatorMatch { matched: 0 };
        assert!(b"EEND".iter().any(|&b| terminator.feed(b)));
    }

    #[test]
    fn test_port_number_argument() {
        let config = load_config("3").expect("port number");
        assert_eq!(config.port.port_number, 3);
        assert!(load_config("0").is_err());
    }
}
