//! Modbus RTU protocol constants
//!
//! Frame size limits follow the serial-line ADU definition: at most 256
//! bytes on the wire, of which 1 is the slave address, 1 the function code
//! and 2 the CRC trailer.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum ADU size on a serial line.
pub const MAX_ADU_SIZE: usize = 256;

/// Maximum function-specific data carried in one ADU.
/// = 256 - slave id (1) - function code (1) - CRC (2)
pub const MAX_DATA_SIZE: usize = 252;

/// Slave address reserved for broadcast; broadcast requests are never
/// answered.
pub const BROADCAST_SLAVE_ID: u8 = 0;

/// High bit of the response function code, set when the slave reports an
/// exception.
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FN_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FN_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FN_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FN_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FN_WRITE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FN_WRITE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FN_WRITE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FN_WRITE_REGISTERS: u8 = 0x10;

/// Mask Write Register (FC22); recognized on the wire, no typed operation.
pub const FN_MASK_WRITE_REGISTER: u8 = 0x16;

/// Read/Write Multiple Registers (FC23)
pub const FN_READ_WRITE_REGISTERS: u8 = 0x17;
