//! Asynchronous serial link driver.
//!
//! A [`ComPort`] owns one serial device and two background tokio tasks: an
//! Rx worker that buffers inbound bytes into a bounded queue and a Tx worker
//! that writes queued frames in order. Callers poll or subscribe to
//! [`PortEvent`]s and never block on device I/O.

pub mod config;
pub mod port;
pub mod serial;
mod util;

pub use config::{Baudrate, LinkConfig, Parity, PortConfig, QueueLimits, StopBits, WordLength};
pub use port::{
    callback, Callback, ComPort, ComPortError, ConnectionState, Notifier, PortEvent, StatsSnapshot,
};
pub use serial::{DeviceError, MockBackend, NativeBackend, SerialBackend, SerialDevice};
