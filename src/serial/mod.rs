pub mod interface;
pub mod mock;
pub mod native;
pub mod signal;

pub use interface::{SerialBackend, SerialDevice};
pub use mock::MockBackend;
pub use native::NativeBackend;
pub use signal::{CompletionSignal, WaitOutcome};

use serde::{Deserialize, Serialize};

/// Port entry reported by [`NativeBackend::available_ports`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unsupported line setting: {0}")]
    Unsupported(String),

    #[error("Device closed")]
    Closed,

    #[error("Completion signal unavailable")]
    SignalUnavailable,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
