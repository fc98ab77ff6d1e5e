pub mod line;

pub use line::{Baudrate, Parity, StopBits, WordLength};

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_RX_CAPACITY: usize = 512;
pub const DEFAULT_TX_FRAMES: usize = 5;
pub const DEFAULT_TX_BYTES: usize = 512;

/// Port number and line parameters of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    pub port_number: u8,
    pub baudrate: Baudrate,
    pub word_length: WordLength,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl PortConfig {
    pub fn new(
        port_number: u8,
        baudrate: Baudrate,
        word_length: WordLength,
        stop_bits: StopBits,
        parity: Parity,
    ) -> Self {
        Self {
            port_number,
            baudrate,
            word_length,
            stop_bits,
            parity,
        }
    }

    /// Short line description such as `115200 8N1`
    pub fn line_summary(&self) -> String {
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        format!(
            "{} {}{}{}",
            self.baudrate,
            u8::from(self.word_length),
            self.parity,
            stop
        )
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_number: 1,
            baudrate: Baudrate::B115200,
            word_length: WordLength::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

/// Capacities of the Rx and Tx queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueLimits {
    /// Bytes held in the Rx queue before new bytes are dropped
    pub rx_capacity: usize,
    /// Frames waiting in the Tx queue
    pub tx_frames: usize,
    /// Byte budget shared by all frames waiting in the Tx queue
    pub tx_bytes: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            rx_capacity: DEFAULT_RX_CAPACITY,
            tx_frames: DEFAULT_TX_FRAMES,
            tx_bytes: DEFAULT_TX_BYTES,
        }
    }
}

/// Full driver settings as stored in a JSON file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub port: PortConfig,
    #[serde(default)]
    pub queues: QueueLimits,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl LinkConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LinkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::debug!("Loaded link configuration from {}", path.display());
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.port_number == 0 {
            return Err(ConfigError::Invalid("port_number must be positive".to_string()));
        }
        if self.queues.rx_capacity == 0 {
            return Err(ConfigError::Invalid("rx_capacity must be positive".to_string()));
        }
        if self.queues.tx_frames == 0 || self.queues.tx_bytes == 0 {
            return Err(ConfigError::Invalid("tx queue limits must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_driver_limits() {
        let config = LinkConfig::default();
        assert_eq!(config.port.port_number, 1);
        assert_eq!(config.queues.rx_capacity, 512);
        assert_eq!(config.queues.tx_frames, 5);
        assert_eq!(config.queues.tx_bytes, 512);
        assert_eq!(config.port.line_summary(), "115200 8N1");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "port": {
                "port_number": 3,
                "baudrate": 9600,
                "word_length": 7,
                "stop_bits": "1.5",
                "parity": "even"
            },
            "queues": { "rx_capacity": 64, "tx_frames": 2 }
        }"#;
        let config = LinkConfig::from_json_str(json).expect("valid config");
        assert_eq!(config.port.port_number, 3);
        assert_eq!(config.port.baudrate, Baudrate::B9600);
        assert_eq!(config.port.word_length, WordLength::Seven);
        assert_eq!(config.port.stop_bits, StopBits::OnePointFive);
        assert_eq!(config.port.parity, Parity::Even);
        assert_eq!(config.queues.rx_capacity, 64);
        assert_eq!(config.queues.tx_frames, 2);
        assert_eq!(config.queues.tx_bytes, DEFAULT_TX_BYTES);
    }

    #[test]
    fn test_unknown_baudrate_rejected() {
        let json = r#"{"port": {"port_number": 1, "baudrate": 12345, "word_length": 8, "stop_bits": "1", "parity": "none"}}"#;
        assert!(matches!(LinkConfig::from_json_str(json), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_port_zero_rejected() {
        let json = r#"{"port": {"port_number": 0, "baudrate": 115200, "word_length": 8, "stop_bits": "2", "parity": "odd"}}"#;
        assert!(matches!(LinkConfig::from_json_str(json), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_json_string_reloads() {
        let mut config = LinkConfig::default();
        config.port.baudrate = Baudrate::B256000;
        config.port.stop_bits = StopBits::Two;
        let json = config.to_json_string().expect("serializable");
        assert!(json.contains("256000"));
        assert_eq!(LinkConfig::from_json_str(&json).expect("valid"), config);
    }
}
