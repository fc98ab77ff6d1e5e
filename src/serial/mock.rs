//! Scripted in-memory serial device.
//!
//! Exposed unconditionally so integration tests and dry runs of tools can
//! drive a [`crate::ComPort`] without hardware.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use super::interface::{SerialBackend, SerialDevice};
use super::{CompletionSignal, DeviceError, Result};
use crate::config::PortConfig;
use crate::util::lock;

/// How the mock answers write requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFault {
    #[default]
    None,
    /// Report this many bytes fewer than requested
    Short(usize),
    /// Fail the write with an IO error
    Error,
}

enum Inbound {
    Byte(u8),
    Error,
}

#[derive(Default)]
struct Faults {
    fail_open: bool,
    fail_configure: bool,
    signal_budget: Option<usize>,
    write: WriteFault,
}

struct MockShared {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    written: Mutex<Vec<Vec<u8>>>,
    faults: Mutex<Faults>,
    writes_paused: watch::Sender<bool>,
    writes_started: AtomicUsize,
    open_devices: AtomicUsize,
    last_config: Mutex<Option<PortConfig>>,
}

#[derive(Clone)]
pub struct MockBackend {
    shared: Arc<MockShared>,
}

impl MockBackend {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (writes_paused, _) = watch::channel(false);
        Self {
            shared: Arc::new(MockShared {
                inbound_tx,
                inbound_rx: tokio::sync::Mutex::new(inbound_rx),
                written: Mutex::new(Vec::new()),
                faults: Mutex::new(Faults::default()),
                writes_paused,
                writes_started: AtomicUsize::new(0),
                open_devices: AtomicUsize::new(0),
                last_config: Mutex::new(None),
            }),
        }
    }

    /// Queue bytes for the device to deliver, one per read
    pub fn feed(&self, bytes: &[u8]) {
        for &byte in bytes {
            let _ = self.shared.inbound_tx.send(Inbound::Byte(byte));
        }
    }

    /// Make the read after all currently fed bytes fail
    pub fn fail_next_read(&self) {
        let _ = self.shared.inbound_tx.send(Inbound::Error);
    }

    pub fn fail_open(&self, fail: bool) {
        lock(&self.shared.faults).fail_open = fail;
    }

    pub fn fail_configure(&self, fail: bool) {
        lock(&self.shared.faults).fail_configure = fail;
    }

    /// Allow only `budget` more completion signals to be created.
    /// `None` removes the limit.
    pub fn limit_signals(&self, budget: Option<usize>) {
        lock(&self.shared.faults).signal_budget = budget;
    }

    pub fn set_write_fault(&self, fault: WriteFault) {
        lock(&self.shared.faults).write = fault;
    }

    /// Hold write requests pending until resumed
    pub fn pause_writes(&self, paused: bool) {
        self.shared.writes_paused.send_replace(paused);
    }

    /// Frames accepted by the device, in write order
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        lock(&self.shared.written).clone()
    }

    pub fn writes_started(&self) -> usize {
        self.shared.writes_started.load(Ordering::SeqCst)
    }

    /// Devices opened and not yet closed
    pub fn open_devices(&self) -> usize {
        self.shared.open_devices.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<PortConfig> {
        *lock(&self.shared.last_config)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SerialBackend for MockBackend {
    async fn open_device(&self, port_number: u8) -> Result<Box<dyn SerialDevice>> {
        if lock(&self.shared.faults).fail_open {
            return Err(DeviceError::PortNotFound(format!("mock port {}", port_number)));
        }
        self.shared.open_devices.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            shared: self.shared.clone(),
            closed: CompletionSignal::new(),
            released: AtomicBool::new(false),
        }))
    }
}

struct MockDevice {
    shared: Arc<MockShared>,
    closed: CompletionSignal,
    released: AtomicBool,
}

#[async_trait]
impl SerialDevice for MockDevice {
    fn configure(&mut self, config: &PortConfig) -> Result<()> {
        if lock(&self.shared.faults).fail_configure {
            return Err(DeviceError::Unsupported(format!(
                "mock rejected {}",
                config.line_summary()
            )));
        }
        *lock(&self.shared.last_config) = Some(*config);
        Ok(())
    }

    fn create_signal(&self) -> Result<CompletionSignal> {
        if self.is_closed() {
            return Err(DeviceError::SignalUnavailable);
        }
        let mut faults = lock(&self.shared.faults);
        if let Some(budget) = faults.signal_budget.as_mut() {
            if *budget == 0 {
                return Err(DeviceError::SignalUnavailable);
            }
            *budget -= 1;
        }
        Ok(self.closed.child())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(DeviceError::Closed);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let mut inbound = self.shared.inbound_rx.lock().await;
        match inbound.recv().await {
            Some(Inbound::Byte(byte)) => {
                buf[0] = byte;
                Ok(1)
            }
            Some(Inbound::Error) => Err(std::io::Error::other("injected read failure").into()),
            None => Err(DeviceError::Closed),
        }
    }

    async fn write(&self, frame: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(DeviceError::Closed);
        }
        self.shared.writes_started.fetch_add(1, Ordering::SeqCst);

        let mut paused = self.shared.writes_paused.subscribe();
        let _ = paused.wait_for(|paused| !*paused).await;

        let fault = lock(&self.shared.faults).write;
        let accepted = match fault {
            WriteFault::None => frame.len(),
            WriteFault::Short(missing) => frame.len().saturating_sub(missing),
            WriteFault::Error => {
                return Err(std::io::Error::other("injected write failure").into());
            }
        };
        lock(&self.shared.written).push(frame[..accepted].to_vec());
        Ok(accepted)
    }

    fn close(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed.close();
        self.shared.open_devices.fetch_sub(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.close();
    }
}
