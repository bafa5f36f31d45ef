//! # Modbus RTU - Asynchronous Serial Master
//!
//! A Modbus RTU master for half-duplex serial lines, in pure Rust on Tokio.
//!
//! The transport owns the serial byte stream exclusively: a background task
//! continuously decodes candidate frames off the line while send calls are
//! serialized end-to-end, so at most one request is ever outstanding. A
//! response is matched to its request by a ticketed single-slot correlator
//! plus a receipt-timestamp filter, which means a frame that was already in
//! flight before a request went out can never be mistaken for its answer.
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Typed API |
//! |------|----------|-----------|
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//! | 0x06 | Write Single Register | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//! | 0x17 | Read/Write Multiple Registers | ✅ |
//! | 0x01/0x02/0x05/0x0F | Coil and discrete-input access | returns `Unsupported` |
//!
//! Arbitrary function codes can still be issued through
//! [`ModbusClient::raw_request`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use modbus_rtu::{ModbusClient, ModbusResult, SerialConfig};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let client = ModbusClient::open("rtu", "/dev/ttyUSB0", &SerialConfig::default())?;
//!
//!     let values = client.read_holding_registers(1, 0, 10).await?;
//!     println!("registers: {values:?}");
//!
//!     client.release().await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus protocol constants
pub mod constants;

/// RTU frame codec: ADU encode/decode and CRC-16
pub mod frame;

/// Serial line configuration and validation
pub mod config;

/// RTU transport: background reader and request correlation
pub mod transport;

/// Typed register operations
pub mod client;

/// Big-endian register field packing
pub mod codec;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use modbus_rtu::tokio) ===
pub use tokio;

// === Core client API ===
pub use client::ModbusClient;

// === Error handling ===
pub use error::{ExceptionCode, ModbusError, ModbusResult};

// === Core types ===
pub use config::{DataBits, Parity, SerialConfig, StopBits};
pub use frame::Frame;
pub use transport::{RtuTransport, TransportStats};

// === Protocol constants (commonly needed) ===
pub use constants::{BROADCAST_SLAVE_ID, MAX_ADU_SIZE, MAX_DATA_SIZE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
