//! Serial line configuration
//!
//! The transport only ever sees a validated configuration: word-shape
//! parameters are enums, so the single open-time check left is the baud-rate
//! table. Validation happens before the device is touched; an unsupported
//! value never causes I/O.

use std::time::Duration;

use crate::error::{ModbusError, ModbusResult};

/// Baud rates the serial layer accepts, the standard termios set.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500_000, 576_000, 921_600, 1_000_000, 1_152_000, 1_500_000, 2_000_000,
    2_500_000, 3_000_000, 3_500_000, 4_000_000,
];

/// Character width on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Line parameters for an RTU serial port, fixed once the transport opens.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// Granularity of the low-level read; also the transport's response
    /// deadline.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    /// 9600 8N1 with a one second read timeout.
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            read_timeout: Duration::from_secs(1),
        }
    }
}

impl SerialConfig {
    /// Check the configuration against the supported value sets.
    pub fn validate(&self) -> ModbusResult<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(ModbusError::configuration(format!(
                "baudrate {} not supported",
                self.baud_rate
            )));
        }
        Ok(())
    }

    /// The read timeout as the serial driver will actually apply it.
    ///
    /// Serial drivers tick in tenths of a second, so the requested timeout
    /// is rounded down to deciseconds and clamped to the representable
    /// 0.1s..25.5s range.
    pub fn effective_read_timeout(&self) -> Duration {
        let deciseconds = (self.read_timeout.as_millis() / 100).clamp(1, 255) as u64;
        Duration::from_millis(deciseconds * 100)
    }
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}
