//! High-level Modbus RTU master client
//!
//! Wraps the transport with typed register operations: payloads are built
//! from big-endian 16-bit fields, responses decoded back into register
//! lists. Coil and discrete-input access is part of the public surface but
//! deliberately unimplemented; those calls always fail with
//! [`ModbusError::Unsupported`] rather than fabricating data.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modbus_rtu::{ModbusClient, ModbusResult, SerialConfig};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let client = ModbusClient::open("rtu", "/dev/ttyUSB0", &SerialConfig::default())?;
//!
//!     // Read 10 holding registers from slave 1, starting at address 0
//!     let values = client.read_holding_registers(1, 0, 10).await?;
//!     println!("registers: {values:?}");
//!
//!     // Write a value to register 100
//!     client.write_register(1, 100, 0x1234).await?;
//!
//!     client.release().await?;
//!     Ok(())
//! }
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec;
use crate::config::SerialConfig;
use crate::constants::{
    FN_READ_HOLDING_REGISTERS, FN_READ_INPUT_REGISTERS, FN_READ_WRITE_REGISTERS, FN_WRITE_REGISTER,
    FN_WRITE_REGISTERS,
};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::Frame;
use crate::transport::{RtuTransport, TransportStats};

/// Modbus master over a serial line.
///
/// All operations take `&self`; concurrent callers are serialized by the
/// transport's send lock, one exchange on the wire at a time.
pub struct ModbusClient {
    handler: RtuTransport,
}

impl std::fmt::Debug for ModbusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusClient").finish_non_exhaustive()
    }
}

impl ModbusClient {
    /// Open a client for the given transport mode and device path.
    ///
    /// `"rtu"` is the only implemented mode; `"ascii"` is recognized but
    /// unsupported, anything else is a configuration error.
    pub fn open(mode: &str, path: &str, config: &SerialConfig) -> ModbusResult<Self> {
        match mode {
            "rtu" => Ok(Self {
                handler: RtuTransport::open(path, config)?,
            }),
            "ascii" => Err(ModbusError::unsupported("ascii transport mode")),
            other => Err(ModbusError::configuration(format!(
                "unsupported mode {other}"
            ))),
        }
    }

    /// Build a client over an already-constructed transport.
    pub fn from_transport(handler: RtuTransport) -> Self {
        Self { handler }
    }

    /// Shut the underlying transport down, stopping its reader task.
    pub async fn release(self) -> ModbusResult<()> {
        self.handler.close().await
    }

    /// Communication counters of the underlying transport.
    pub fn stats(&self) -> TransportStats {
        self.handler.stats()
    }

    /// Issue a raw request and return the matched response payload, if the
    /// function carries one.
    pub async fn raw_request(
        &self,
        slave_id: u8,
        function: u8,
        data: impl Into<Bytes>,
    ) -> ModbusResult<Option<Bytes>> {
        self.handler
            .send(&Frame::new(slave_id, function, data))
            .await
    }

    /// Read holding registers (FC03).
    pub async fn read_holding_registers(
        &self,
        slave_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        let data = self
            .raw_request(
                slave_id,
                FN_READ_HOLDING_REGISTERS,
                codec::read_request(address, count),
            )
            .await?;
        Ok(codec::registers_from_be(data.as_deref().unwrap_or(&[])))
    }

    /// Read input registers (FC04).
    pub async fn read_input_registers(
        &self,
        slave_id: u8,
        address: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        let data = self
            .raw_request(
                slave_id,
                FN_READ_INPUT_REGISTERS,
                codec::read_request(address, count),
            )
            .await?;
        Ok(codec::registers_from_be(data.as_deref().unwrap_or(&[])))
    }

    /// Read and write registers in one transaction (FC23).
    ///
    /// The write happens before the read on the device; the returned values
    /// are the `read_count` registers starting at `read_address`.
    pub async fn read_write_registers(
        &self,
        slave_id: u8,
        read_address: u16,
        read_count: u16,
        write_address: u16,
        write_values: &[u16],
    ) -> ModbusResult<Vec<u16>> {
        let mut payload = BytesMut::with_capacity(8 + write_values.len() * 2);
        payload.put_u16(read_address);
        payload.put_u16(read_count);
        payload.put_u16(write_address);
        payload.put_u16(write_values.len() as u16);
        payload.put(codec::registers_to_be(write_values));

        let data = self
            .raw_request(slave_id, FN_READ_WRITE_REGISTERS, payload.freeze())
            .await?;
        Ok(codec::registers_from_be(data.as_deref().unwrap_or(&[])))
    }

    /// Write a single register (FC06).
    pub async fn write_register(&self, slave_id: u8, address: u16, value: u16) -> ModbusResult<()> {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u16(address);
        payload.put_u16(value);

        self.raw_request(slave_id, FN_WRITE_REGISTER, payload.freeze())
            .await?;
        Ok(())
    }

    /// Write a block of registers (FC16).
    pub async fn write_registers(
        &self,
        slave_id: u8,
        address: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        let mut payload = BytesMut::with_capacity(4 + values.len() * 2);
        payload.put_u16(address);
        payload.put_u16(values.len() as u16);
        payload.put(codec::registers_to_be(values));

        self.raw_request(slave_id, FN_WRITE_REGISTERS, payload.freeze())
            .await?;
        Ok(())
    }

    /// Read coils (FC01). Not implemented.
    pub async fn read_coils(
        &self,
        _slave_id: u8,
        _address: u16,
        _count: u16,
    ) -> ModbusResult<Vec<bool>> {
        Err(ModbusError::unsupported("read coils"))
    }

    /// Read discrete inputs (FC02). Not implemented.
    pub async fn read_discrete_inputs(
        &self,
        _slave_id: u8,
        _address: u16,
        _count: u16,
    ) -> ModbusResult<Vec<bool>> {
        Err(ModbusError::unsupported("read discrete inputs"))
    }

    /// Write a single coil (FC05). Not implemented.
    pub async fn write_coil(
        &self,
        _slave_id: u8,
        _address: u16,
        _value: bool,
    ) -> ModbusResult<()> {
        Err(ModbusError::unsupported("write coil"))
    }

    /// Write multiple coils (FC15). Not implemented.
    pub async fn write_coils(
        &self,
        _slave_id: u8,
        _address: u16,
        _values: &[bool],
    ) -> ModbusResult<()> {
        Err(ModbusError::unsupported("write coils"))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn unknown_mode_is_configuration_error() {
        let err = ModbusClient::open("tcp", "/dev/null", &SerialConfig::default()).unwrap_err();
        assert!(matches!(err, ModbusError::Configuration { .. }));
        assert!(err.to_string().contains("tcp"));
    }

    #[test]
    fn ascii_mode_is_unsupported() {
        let err = ModbusClient::open("ascii", "/dev/null", &SerialConfig::default()).unwrap_err();
        assert!(matches!(err, ModbusError::Unsupported { .. }));
    }

    #[test]
    fn invalid_config_rejected_before_io() {
        let config = SerialConfig {
            baud_rate: 31337,
            ..Default::default()
        };
        // A nonexistent path would be an I/O error; configuration must win
        // because it is checked first.
        let err = ModbusClient::open("rtu", "/definitely/not/a/port", &config).unwrap_err();
        assert!(matches!(err, ModbusError::Configuration { .. }));
    }

    #[tokio::test]
    async fn coil_operations_are_unsupported() {
        let (master, _peer) = tokio::io::duplex(64);
        let client = ModbusClient::from_transport(RtuTransport::from_stream(
            master,
            Duration::from_millis(100),
        ));

        assert!(matches!(
            client.read_coils(1, 0, 8).await,
            Err(ModbusError::Unsupported { .. })
        ));
        assert!(matches!(
            client.read_discrete_inputs(1, 0, 8).await,
            Err(ModbusError::Unsupported { .. })
        ));
        assert!(matches!(
            client.write_coil(1, 0, true).await,
            Err(ModbusError::Unsupported { .. })
        ));
        assert!(matches!(
            client.write_coils(1, 0, &[true, false]).await,
            Err(ModbusError::Unsupported { .. })
        ));
    }
}
