use serde::{Deserialize, Serialize};

/// Supported line speeds in bits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Baudrate {
    B110,
    B300,
    B600,
    B1200,
    B2400,
    B4800,
    B9600,
    B14400,
    B19200,
    B38400,
    B56000,
    B57600,
    B115200,
    B128000,
    B256000,
}

impl Baudrate {
    pub const ALL: [Baudrate; 15] = [
        Baudrate::B110,
        Baudrate::B300,
        Baudrate::B600,
        Baudrate::B1200,
        Baudrate::B2400,
        Baudrate::B4800,
        Baudrate::B9600,
        Baudrate::B14400,
        Baudrate::B19200,
        Baudrate::B38400,
        Baudrate::B56000,
        Baudrate::B57600,
        Baudrate::B115200,
        Baudrate::B128000,
        Baudrate::B256000,
    ];

    pub fn bits_per_second(self) -> u32 {
        match self {
            Baudrate::B110 => 110,
            Baudrate::B300 => 300,
            Baudrate::B600 => 600,
            Baudrate::B1200 => 1200,
            Baudrate::B2400 => 2400,
            Baudrate::B4800 => 4800,
            Baudrate::B9600 => 9600,
            Baudrate::B14400 => 14400,
            Baudrate::B19200 => 19200,
            Baudrate::B38400 => 38400,
            Baudrate::B56000 => 56000,
            Baudrate::B57600 => 57600,
            Baudrate::B115200 => 115200,
            Baudrate::B128000 => 128000,
            Baudrate::B256000 => 256000,
        }
    }
}

impl TryFrom<u32> for Baudrate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Baudrate::ALL
            .into_iter()
            .find(|b| b.bits_per_second() == value)
            .ok_or_else(|| format!("Unsupported baudrate: {}", value))
    }
}

impl From<Baudrate> for u32 {
    fn from(value: Baudrate) -> Self {
        value.bits_per_second()
    }
}

impl std::fmt::Display for Baudrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

/// Data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WordLength {
    Seven,
    Eight,
    Nine,
}

impl TryFrom<u8> for WordLength {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            7 => Ok(WordLength::Seven),
            8 => Ok(WordLength::Eight),
            9 => Ok(WordLength::Nine),
            other => Err(format!("Unsupported word length: {}", other)),
        }
    }
}

impl From<WordLength> for u8 {
    fn from(value: WordLength) -> Self {
        match value {
            WordLength::Seven => 7,
            WordLength::Eight => 8,
            WordLength::Nine => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopBits {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "1.5")]
    OnePointFive,
    #[serde(rename = "2")]
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(f, "{}", c)
    }
}
