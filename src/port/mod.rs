pub mod callbacks;
pub mod models;
pub mod queues;
mod workers;

pub use callbacks::{callback, Callback, CallbackRegistry, Notifier};
pub use models::{ConnectionState, PortEvent, PortStats, StatsSnapshot};
pub use queues::{PendingFrame, RxQueue, TxQueue, TxWake};

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::config::{Baudrate, LinkConfig, Parity, PortConfig, QueueLimits, StopBits, WordLength};
use crate::serial::{CompletionSignal, DeviceError, SerialBackend, SerialDevice};
use crate::util::lock;

/// How long `close` waits for each worker to acknowledge shutdown
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

const CLOSED: u64 = 0;

#[derive(Debug, thiserror::Error)]
pub enum ComPortError {
    #[error("comport already open")]
    AlreadyOpen,

    #[error("bad comport number")]
    BadPortNumber,

    #[error("cannot open comport: {0}")]
    OpenFailure(#[source] DeviceError),

    #[error("cannot set comport config: {0}")]
    ConfigFailure(#[source] DeviceError),

    #[error("cannot initialize rx event: {0}")]
    EventInitFailure(#[source] DeviceError),

    #[error("comport is closed")]
    PortClosed,

    #[error("tx queue full")]
    QueueFull,

    #[error("cannot initialize tx event: {0}")]
    TxEventInitFailure(#[source] DeviceError),
}

impl ComPortError {
    /// Fixed diagnostic text, without the device detail
    pub fn text(&self) -> &'static str {
        match self {
            ComPortError::AlreadyOpen => "comport already open",
            ComPortError::BadPortNumber => "bad comport number",
            ComPortError::OpenFailure(_) => "cannot open comport",
            ComPortError::ConfigFailure(_) => "cannot set comport config",
            ComPortError::EventInitFailure(_) => "cannot initialize rx event",
            ComPortError::PortClosed => "comport is closed",
            ComPortError::QueueFull => "tx queue full",
            ComPortError::TxEventInitFailure(_) => "cannot initialize tx event",
        }
    }
}

pub type Result<T> = std::result::Result<T, ComPortError>;

/// Device and wake state of one open session, shared with its workers
#[derive(Clone)]
pub(crate) struct Link {
    pub(crate) session: u64,
    pub(crate) device: Arc<dyn SerialDevice>,
    pub(crate) wake: Arc<TxWake>,
}

/// State the controller shares with its workers
pub(crate) struct Shared {
    /// `CLOSED` or the id of the open session
    state: AtomicU64,
    next_session: AtomicU64,
    link: Mutex<Option<Link>>,
    rx: Mutex<RxQueue>,
    tx: Mutex<TxQueue>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) stats: PortStats,
}

impl Shared {
    fn new(limits: QueueLimits) -> Self {
        Self {
            state: AtomicU64::new(CLOSED),
            next_session: AtomicU64::new(CLOSED + 1),
            link: Mutex::new(None),
            rx: Mutex::new(RxQueue::new(limits.rx_capacity)),
            tx: Mutex::new(TxQueue::new(limits.tx_frames, limits.tx_bytes)),
            callbacks: CallbackRegistry::new(),
            stats: PortStats::default(),
        }
    }

    fn is_open(&self) -> bool {
        self.state.load(Ordering::SeqCst) != CLOSED
    }

    pub(crate) fn is_session(&self, session: u64) -> bool {
        self.state.load(Ordering::SeqCst) == session
    }

    /// Queue a byte read by `session`'s Rx worker.
    ///
    /// Returns false once the session is no longer open; the byte is then
    /// discarded. The check runs under the Rx lock so a byte can never land
    /// after `close` cleared the queue.
    pub(crate) fn push_rx(&self, session: u64, byte: u8) -> bool {
        let kept = {
            let mut queue = lock(&self.rx);
            if !self.is_session(session) {
                return false;
            }
            queue.push(byte)
        };
        self.stats.record_rx(kept);
        if !kept {
            log::trace!("Rx queue full, dropped byte 0x{:02X}", byte);
        }
        true
    }

    pub(crate) fn pop_tx(&self) -> Option<PendingFrame> {
        lock(&self.tx).pop()
    }

    fn clear_queues(&self) {
        lock(&self.rx).clear();
        lock(&self.tx).clear();
    }

    /// End `link`'s session after a device failure.
    ///
    /// Only the worker that moves the session from open to closed fires the
    /// shutdown notification; a session already closed by `close` or by the
    /// peer worker is left alone.
    pub(crate) fn fail_session(&self, link: &Link, reason: impl Display) {
        if self
            .state
            .compare_exchange(link.session, CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Session {} already closed ({})", link.session, reason);
            return;
        }

        log::warn!("Serial link failed, shutting down session {}: {}", link.session, reason);
        self.stats.record_failure();
        link.device.close();
        link.wake.release();
        self.callbacks.notify(PortEvent::Shutdown);
    }
}

/// Controller-side handles of one open session
struct Session {
    link: Link,
    rx_signal: Arc<CompletionSignal>,
    rx_done: oneshot::Receiver<()>,
    tx_done: oneshot::Receiver<()>,
}

impl Session {
    fn release(&self) {
        self.rx_signal.close();
        self.link.device.close();
    }

    /// Best-effort join: a worker that misses the deadline keeps unwinding
    /// on its own.
    async fn join(self) {
        let session = self.link.session;
        for (name, done) in [("Rx", self.rx_done), ("Tx", self.tx_done)] {
            if timeout(WORKER_JOIN_TIMEOUT, done).await.is_err() {
                log::warn!(
                    "{} worker of session {} did not stop within {:?}",
                    name,
                    session,
                    WORKER_JOIN_TIMEOUT
                );
            }
        }
    }
}

/// Full-duplex serial connection with bounded Rx/Tx queues.
///
/// Inbound bytes are buffered by a background Rx worker and read with
/// [`ComPort::rx_data`]; outbound frames are queued with [`ComPort::tx_data`]
/// and written in order by a background Tx worker. Both workers are tokio
/// tasks, so [`ComPort::open`] must run inside a tokio runtime.
pub struct ComPort {
    config: Mutex<PortConfig>,
    limits: QueueLimits,
    backend: Arc<dyn SerialBackend>,
    shared: Arc<Shared>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl ComPort {
    pub fn new(config: PortConfig, backend: Arc<dyn SerialBackend>) -> Self {
        Self::with_limits(config, QueueLimits::default(), backend)
    }

    pub fn with_limits(
        config: PortConfig,
        limits: QueueLimits,
        backend: Arc<dyn SerialBackend>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            limits,
            backend,
            shared: Arc::new(Shared::new(limits)),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn from_link_config(config: LinkConfig, backend: Arc<dyn SerialBackend>) -> Self {
        Self::with_limits(config.port, config.queues, backend)
    }

    /// Open the device, apply the line configuration and start the workers
    pub async fn open(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if self.is_open() {
            return Err(ComPortError::AlreadyOpen);
        }

        if let Some(stale) = session.take() {
            log::debug!("Releasing failed session {}", stale.link.session);
            stale.release();
            *lock(&self.shared.link) = None;
        }

        let config = *lock(&self.config);
        if config.port_number == 0 {
            return Err(ComPortError::BadPortNumber);
        }

        let mut device = self
            .backend
            .open_device(config.port_number)
            .await
            .map_err(ComPortError::OpenFailure)?;

        if let Err(e) = device.configure(&config) {
            device.close();
            return Err(ComPortError::ConfigFailure(e));
        }

        let rx_signal = match device.create_signal() {
            Ok(signal) => Arc::new(signal),
            Err(e) => {
                device.close();
                return Err(ComPortError::EventInitFailure(e));
            }
        };

        let link = Link {
            session: self.shared.next_session.fetch_add(1, Ordering::SeqCst),
            device: Arc::from(device),
            wake: Arc::new(TxWake::new()),
        };
        *lock(&self.shared.link) = Some(link.clone());
        self.shared.clear_queues();
        self.shared.state.store(link.session, Ordering::SeqCst);

        let (rx_done_tx, rx_done) = oneshot::channel();
        let (tx_done_tx, tx_done) = oneshot::channel();
        tokio::spawn(workers::rx_worker(
            self.shared.clone(),
            link.clone(),
            rx_signal.clone(),
            rx_done_tx,
        ));
        tokio::spawn(workers::tx_worker(self.shared.clone(), link.clone(), tx_done_tx));

        log::info!(
            "Opened comport {} at {} (session {})",
            config.port_number,
            config.line_summary(),
            link.session
        );
        *session = Some(Session {
            link,
            rx_signal,
            rx_done,
            tx_done,
        });
        Ok(())
    }

    /// Close the connection. Safe to call in any state.
    ///
    /// Waits up to [`WORKER_JOIN_TIMEOUT`] per worker; a worker may still be
    /// unwinding when this returns.
    pub async fn close(&self) {
        let session = {
            let mut guard = self.session.lock().await;
            self.shared.state.store(CLOSED, Ordering::SeqCst);
            let session = guard.take();
            if let Some(session) = &session {
                session.release();
            }
            *lock(&self.shared.link) = None;
            self.shared.clear_queues();
            if let Some(session) = &session {
                session.link.wake.release();
            }
            session
        };

        if let Some(session) = session {
            let id = session.link.session;
            session.join().await;
            log::info!("Closed comport session {}", id);
        }
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_open() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn update_config(&self, apply: impl FnOnce(&mut PortConfig)) -> Result<()> {
        // A held lifecycle lock means open or close is in progress.
        let _lifecycle = self
            .session
            .try_lock()
            .map_err(|_| ComPortError::AlreadyOpen)?;
        if self.is_open() {
            return Err(ComPortError::AlreadyOpen);
        }
        apply(&mut lock(&self.config));
        Ok(())
    }

    pub fn config(&self) -> PortConfig {
        *lock(&self.config)
    }

    pub fn limits(&self) -> QueueLimits {
        self.limits
    }

    pub fn set_port_number(&self, port_number: u8) -> Result<()> {
        if port_number == 0 {
            return Err(ComPortError::BadPortNumber);
        }
        self.update_config(|config| config.port_number = port_number)
    }

    pub fn port_number(&self) -> u8 {
        self.config().port_number
    }

    pub fn set_baudrate(&self, baudrate: Baudrate) -> Result<()> {
        self.update_config(|config| config.baudrate = baudrate)
    }

    pub fn baudrate(&self) -> Baudrate {
        self.config().baudrate
    }

    pub fn set_word_length(&self, word_length: WordLength) -> Result<()> {
        self.update_config(|config| config.word_length = word_length)
    }

    pub fn word_length(&self) -> WordLength {
        self.config().word_length
    }

    pub fn set_stop_bits(&self, stop_bits: StopBits) -> Result<()> {
        self.update_config(|config| config.stop_bits = stop_bits)
    }

    pub fn stop_bits(&self) -> StopBits {
        self.config().stop_bits
    }

    pub fn set_parity(&self, parity: Parity) -> Result<()> {
        self.update_config(|config| config.parity = parity)
    }

    pub fn parity(&self) -> Parity {
        self.config().parity
    }

    /// Number of bytes waiting in the Rx queue
    pub fn rx_data_count(&self) -> usize {
        lock(&self.shared.rx).len()
    }

    /// Move up to `max_count` received bytes, oldest first, onto the end of
    /// `out`. Returns how many were moved.
    pub fn rx_data(&self, out: &mut Vec<u8>, max_count: usize) -> usize {
        lock(&self.shared.rx).drain_into(out, max_count)
    }

    /// Queue one frame for transmission
    pub fn tx_data(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let data = data.into();
        let link = lock(&self.shared.link)
            .clone()
            .ok_or(ComPortError::PortClosed)?;

        {
            let mut queue = lock(&self.shared.tx);
            if !self.shared.is_session(link.session) {
                return Err(ComPortError::PortClosed);
            }
            if !queue.has_room(data.len()) {
                self.shared.stats.record_rejected();
                return Err(ComPortError::QueueFull);
            }
            let signal = link
                .device
                .create_signal()
                .map_err(ComPortError::TxEventInitFailure)?;
            log::trace!("Queued {} byte frame", data.len());
            queue.push(PendingFrame::new(data, signal));
        }

        link.wake.raise();
        Ok(())
    }

    /// Frames admitted but not yet taken by the Tx worker
    pub fn pending_tx_frames(&self) -> usize {
        lock(&self.shared.tx).len()
    }

    pub fn tx_bytes_in_flight(&self) -> usize {
        lock(&self.shared.tx).bytes_in_flight()
    }

    /// Subscribe to `event`. Returns false if this exact handle was already subscribed.
    ///
    /// Callbacks run on a worker task with the registry locked; they must not
    /// subscribe or unsubscribe from inside the callback.
    pub fn subscribe(&self, event: PortEvent, callback: Callback) -> bool {
        self.shared.callbacks.subscribe(event, callback)
    }

    pub fn unsubscribe(&self, event: PortEvent, callback: &Callback) -> bool {
        self.shared.callbacks.unsubscribe(event, callback)
    }

    pub fn subscriber_count(&self, event: PortEvent) -> usize {
        self.shared.callbacks.count(event)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Diagnostic text for the outcome of an operation
    pub fn text_of_result<T>(result: &Result<T>) -> &'static str {
        match result {
            Ok(_) => "success",
            Err(e) => e.text(),
        }
    }
}

impl Drop for ComPort {
    fn drop(&mut self) {
        self.shared.state.store(CLOSED, Ordering::SeqCst);
        if let Some(session) = self.session.get_mut().take() {
            session.release();
            session.link.wake.release();
        }
        *lock(&self.shared.link) = None;
        self.shared.clear_queues();
    }
}
