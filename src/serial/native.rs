use async_trait::async_trait;
use std::sync::PoisonError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, MutexGuard};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use super::interface::{SerialBackend, SerialDevice};
use super::{CompletionSignal, DeviceError, Result, SerialPortInfo};
use crate::config::{PortConfig, StopBits, WordLength};

/// Backend for real hardware through `tokio-serial`
pub struct NativeBackend {
    naming: fn(u8) -> String,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            naming: default_port_name,
        }
    }

    /// Use a custom mapping from port number to device path
    pub fn with_naming(naming: fn(u8) -> String) -> Self {
        Self { naming }
    }

    pub fn port_name(&self, port_number: u8) -> String {
        (self.naming)(port_number)
    }

    /// List serial ports present on this machine
    pub fn available_ports() -> Result<Vec<SerialPortInfo>> {
        let ports = serialport::available_ports()?;
        let infos = ports
            .into_iter()
            .map(|port| match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                    port_name: port.port_name,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    serial_number: usb.serial_number,
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                },
                _ => SerialPortInfo {
                    port_name: port.port_name,
                    vid: None,
                    pid: None,
                    serial_number: None,
                    manufacturer: None,
                    product: None,
                },
            })
            .collect();
        Ok(infos)
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
fn default_port_name(port_number: u8) -> String {
    format!("\\\\.\\COM{}", port_number)
}

// COM1 corresponds to the first UART, /dev/ttyS0.
#[cfg(not(windows))]
fn default_port_name(port_number: u8) -> String {
    format!("/dev/ttyS{}", port_number.saturating_sub(1))
}

#[async_trait]
impl SerialBackend for NativeBackend {
    async fn open_device(&self, port_number: u8) -> Result<Box<dyn SerialDevice>> {
        let port_name = self.port_name(port_number);
        let stream = tokio_serial::new(&port_name, 9600)
            .open_native_async()
            .map_err(|e| DeviceError::ConnectionFailed(format!("{}: {}", port_name, e)))?;

        log::debug!("Opened serial device {}", port_name);
        Ok(Box::new(NativeDevice::new(port_name, stream)))
    }
}

/// Opened `tokio-serial` stream, split into independent read and write halves
/// once configured
pub struct NativeDevice {
    port_name: String,
    unconfigured: std::sync::Mutex<Option<SerialStream>>,
    reader: Mutex<Option<ReadHalf<SerialStream>>>,
    writer: Mutex<Option<WriteHalf<SerialStream>>>,
    closed: CompletionSignal,
}

impl NativeDevice {
    fn new(port_name: String, stream: SerialStream) -> Self {
        Self {
            port_name,
            unconfigured: std::sync::Mutex::new(Some(stream)),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            closed: CompletionSignal::new(),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Lock on one stream half that drops the half when released after the
/// device closed. `close` cannot take a half while an operation holds it, so
/// the holder does it instead, even when its future is dropped mid-await.
struct HeldHalf<'a, T> {
    half: MutexGuard<'a, Option<T>>,
    closed: &'a CompletionSignal,
}

impl<'a, T> HeldHalf<'a, T> {
    async fn acquire(slot: &'a Mutex<Option<T>>, closed: &'a CompletionSignal) -> Self {
        Self {
            half: slot.lock().await,
            closed,
        }
    }

    fn get(&mut self) -> Result<&mut T> {
        if self.closed.is_closed() {
            return Err(DeviceError::Closed);
        }
        self.half.as_mut().ok_or(DeviceError::Closed)
    }
}

impl<T> Drop for HeldHalf<'_, T> {
    fn drop(&mut self) {
        if self.closed.is_closed() {
            self.half.take();
        }
    }
}

fn data_bits(word_length: WordLength) -> Result<tokio_serial::DataBits> {
    match word_length {
        WordLength::Seven => Ok(tokio_serial::DataBits::Seven),
        WordLength::Eight => Ok(tokio_serial::DataBits::Eight),
        WordLength::Nine => Err(DeviceError::Unsupported("9 data bits".to_string())),
    }
}

fn stop_bits(stop_bits: StopBits) -> Result<tokio_serial::StopBits> {
    match stop_bits {
        StopBits::One => Ok(tokio_serial::StopBits::One),
        StopBits::Two => Ok(tokio_serial::StopBits::Two),
        StopBits::OnePointFive => Err(DeviceError::Unsupported("1.5 stop bits".to_string())),
    }
}

fn apply_line(stream: &mut SerialStream, config: &PortConfig) -> Result<()> {
    let data_bits = data_bits(config.word_length)?;
    let stop_bits = stop_bits(config.stop_bits)?;
    let failed = |e: tokio_serial::Error| DeviceError::ConnectionFailed(e.to_string());

    stream.set_baud_rate(config.baudrate.bits_per_second()).map_err(failed)?;
    stream.set_data_bits(data_bits).map_err(failed)?;
    stream.set_stop_bits(stop_bits).map_err(failed)?;
    stream.set_parity(parity(config.parity)).map_err(failed)?;
    stream.set_flow_control(tokio_serial::FlowControl::None).map_err(failed)?;
    Ok(())
}

fn parity(parity: crate::config::Parity) -> tokio_serial::Parity {
    match parity {
        crate::config::Parity::None => tokio_serial::Parity::None,
        crate::config::Parity::Odd => tokio_serial::Parity::Odd,
        crate::config::Parity::Even => tokio_serial::Parity::Even,
    }
}

#[async_trait]
impl SerialDevice for NativeDevice {
    fn configure(&mut self, config: &PortConfig) -> Result<()> {
        if self.closed.is_closed() {
            return Err(DeviceError::Closed);
        }
        let mut stream = self
            .unconfigured
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| DeviceError::Unsupported("device already configured".to_string()))?;

        apply_line(&mut stream, config)?;

        let (reader, writer) = tokio::io::split(stream);
        *self.reader.get_mut() = Some(reader);
        *self.writer.get_mut() = Some(writer);
        log::debug!("Configured {} as {}", self.port_name, config.line_summary());
        Ok(())
    }

    fn create_signal(&self) -> Result<CompletionSignal> {
        if self.closed.is_closed() {
            return Err(DeviceError::SignalUnavailable);
        }
        Ok(self.closed.child())
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut held = HeldHalf::acquire(&self.reader, &self.closed).await;
        let reader = held.get()?;
        Ok(reader.read(buf).await?)
    }

    async fn write(&self, frame: &[u8]) -> Result<usize> {
        let mut held = HeldHalf::acquire(&self.writer, &self.closed).await;
        let writer = held.get()?;

        let mut written = 0;
        while written < frame.len() {
            let n = writer.write(&frame[written..]).await?;
            if n == 0 {
                break;
            }
            written += n;
        }
        writer.flush().await?;
        Ok(written)
    }

    fn close(&self) {
        if self.closed.is_closed() {
            return;
        }
        self.closed.close();
        if let Ok(mut stream) = self.unconfigured.lock() {
            stream.take();
        }
        // A half held by an outstanding operation is dropped by its HeldHalf.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        log::debug!("Closed serial device {}", self.port_name);
    }

    fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }
}
