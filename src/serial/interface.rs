use async_trait::async_trait;

use super::{CompletionSignal, Result};
use crate::config::PortConfig;

/// Opens serial devices by port number
#[async_trait]
pub trait SerialBackend: Send + Sync {
    /// Open the device behind `port_number`. The returned device is not yet
    /// configured.
    async fn open_device(&self, port_number: u8) -> Result<Box<dyn SerialDevice>>;
}

/// One opened serial device.
///
/// `read` and `write` may run concurrently from different tasks; a device
/// is full duplex. Both report the number of bytes actually transferred.
#[async_trait]
pub trait SerialDevice: Send + Sync {
    /// Apply line parameters (baudrate, word length, stop bits, parity)
    fn configure(&mut self, config: &PortConfig) -> Result<()>;

    /// Create a completion signal bound to this device. Closing the device
    /// abandons every wait on signals it created.
    fn create_signal(&self) -> Result<CompletionSignal>;

    /// Read into `buf`, resolving once at least one byte is available
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write the whole of `frame` as one request
    async fn write(&self, frame: &[u8]) -> Result<usize>;

    /// Release the device. Safe to call on an already closed device.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
