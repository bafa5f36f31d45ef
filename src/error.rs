//! Error types for Modbus RTU communication
//!
//! Every fallible operation in this crate returns [`ModbusResult`]. The error
//! enumeration keeps transport failures, framing failures, protocol
//! violations and device-reported exceptions as distinct variants so callers
//! can branch without inspecting message strings.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for Modbus operations.
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors produced by the RTU master.
#[derive(Error, Debug, Clone)]
pub enum ModbusError {
    /// Unsupported line configuration or transport mode; raised before any
    /// I/O is attempted.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Stream read/write failure. `kind` preserves the underlying
    /// [`io::ErrorKind`] so the reader loop can tell a closed stream from a
    /// transient fault.
    #[error("I/O error: {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// Malformed frame head or body during decode.
    #[error("frame error: {message}")]
    Frame { message: String },

    /// CRC trailer did not match the received frame.
    #[error("crc not matched: expected {expected:04X}, got {actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Request payload exceeds the 252-byte ADU data limit.
    #[error("pdu length too large: {len} bytes")]
    FrameTooLarge { len: usize },

    /// Accepted response does not belong to the outstanding request.
    #[error(
        "mismatched response: expected slave {expected_slave}/function {expected_function:#04X}, \
         got slave {actual_slave}/function {actual_function:#04X}"
    )]
    Mismatch {
        expected_slave: u8,
        expected_function: u8,
        actual_slave: u8,
        actual_function: u8,
    },

    /// The slave answered with a Modbus exception frame.
    #[error("device exception on function {function:#04X}: {code}")]
    Exception { function: u8, code: ExceptionCode },

    /// The response wait was abandoned after `timeout_ms` milliseconds.
    #[error("timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Operation recognized but not implemented (ASCII mode, coil and
    /// discrete-input access).
    #[error("not implemented: {operation}")]
    Unsupported { operation: String },
}

impl ModbusError {
    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a frame error.
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported<S: Into<String>>(operation: S) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Whether this is an I/O error that means the stream is gone for good.
    ///
    /// The background reader exits on these; everything else it logs and
    /// retries.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io {
                kind: io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected,
                ..
            }
        )
    }

    /// Whether retrying the failed operation could plausibly succeed.
    ///
    /// The transport itself never retries; this is for callers layering
    /// their own retry policy on top.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::Timeout { .. } => !self.is_disconnect(),
            Self::Exception { code, .. } => {
                matches!(code, ExceptionCode::Acknowledge | ExceptionCode::DeviceBusy)
            }
            _ => false,
        }
    }
}

impl From<io::Error> for ModbusError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<tokio_serial::Error> for ModbusError {
    fn from(err: tokio_serial::Error) -> Self {
        let kind = match err.kind() {
            tokio_serial::ErrorKind::Io(kind) => kind,
            _ => io::ErrorKind::Other,
        };
        Self::Io {
            kind,
            message: err.to_string(),
        }
    }
}

/// Exception codes a slave can return instead of a normal payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerFailure,
    Acknowledge,
    DeviceBusy,
    MemoryParityError,
    ResponseLengthError,
    /// Any code outside the fixed enumeration.
    Unknown(u8),
}

impl ExceptionCode {
    /// Map a wire byte onto the enumeration. Never fails; unlisted values
    /// become [`ExceptionCode::Unknown`].
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::IllegalFunction,
            2 => Self::IllegalDataAddress,
            3 => Self::IllegalDataValue,
            4 => Self::ServerFailure,
            5 => Self::Acknowledge,
            6 => Self::DeviceBusy,
            7 => Self::MemoryParityError,
            8 => Self::ResponseLengthError,
            other => Self::Unknown(other),
        }
    }

    /// The wire byte for this code.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::IllegalFunction => 1,
            Self::IllegalDataAddress => 2,
            Self::IllegalDataValue => 3,
            Self::ServerFailure => 4,
            Self::Acknowledge => 5,
            Self::DeviceBusy => 6,
            Self::MemoryParityError => 7,
            Self::ResponseLengthError => 8,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalFunction => write!(f, "illegal function"),
            Self::IllegalDataAddress => write!(f, "illegal data address"),
            Self::IllegalDataValue => write!(f, "illegal data value"),
            Self::ServerFailure => write!(f, "server failure"),
            Self::Acknowledge => write!(f, "acknowledge"),
            Self::DeviceBusy => write!(f, "device busy"),
            Self::MemoryParityError => write!(f, "memory parity error"),
            Self::ResponseLengthError => write!(f, "exception response length error"),
            Self::Unknown(code) => write!(f, "unknown exception code {code}"),
        }
    }
}
