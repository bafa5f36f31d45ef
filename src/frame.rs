//! RTU frame codec
//!
//! An ADU on the wire is `slave id (1) | function code (1) | data (0..252) |
//! CRC-16 (2, low byte first)`. Encoding is a straight concatenation with a
//! size check; decoding is head-driven: the function code and the third byte
//! determine how much more of the stream belongs to the frame, after which
//! the CRC trailer gates acceptance.

use bytes::Bytes;
use crc::{Crc, CRC_16_MODBUS};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::{
    EXCEPTION_FLAG, FN_READ_COILS, FN_READ_DISCRETE_INPUTS, FN_READ_HOLDING_REGISTERS,
    FN_READ_INPUT_REGISTERS, FN_READ_WRITE_REGISTERS, FN_WRITE_COIL, FN_WRITE_COILS,
    FN_WRITE_REGISTER, FN_WRITE_REGISTERS, MAX_DATA_SIZE,
};
use crate::error::{ModbusError, ModbusResult};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC-16/MODBUS over `data` (polynomial 0xA001 reflected, initial 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// A request or decoded response: slave address, function code and the
/// function-specific data between the head and the CRC trailer.
///
/// For read-type responses `data` still starts with the byte-count prefix;
/// stripping it is the correlator's job once the frame is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub slave_id: u8,
    pub function: u8,
    pub data: Bytes,
}

impl Frame {
    pub fn new(slave_id: u8, function: u8, data: impl Into<Bytes>) -> Self {
        Self {
            slave_id,
            function,
            data: data.into(),
        }
    }

    /// Whether the function code marks this frame as a device exception.
    pub fn is_exception(&self) -> bool {
        self.function & EXCEPTION_FLAG != 0
    }
}

/// Response carries a byte-count prefix followed by that many payload bytes.
pub(crate) fn is_read_function(code: u8) -> bool {
    matches!(
        code,
        FN_READ_COILS
            | FN_READ_DISCRETE_INPUTS
            | FN_READ_HOLDING_REGISTERS
            | FN_READ_INPUT_REGISTERS
            | FN_READ_WRITE_REGISTERS
    )
}

/// Response is a fixed-size echo of address and value fields.
pub(crate) fn is_write_function(code: u8) -> bool {
    matches!(
        code,
        FN_WRITE_COIL | FN_WRITE_COILS | FN_WRITE_REGISTER | FN_WRITE_REGISTERS
    )
}

/// Serialize a frame into wire bytes with the CRC trailer appended.
pub fn encode(frame: &Frame) -> ModbusResult<Vec<u8>> {
    if frame.data.len() > MAX_DATA_SIZE {
        return Err(ModbusError::FrameTooLarge {
            len: frame.data.len(),
        });
    }

    let mut adu = Vec::with_capacity(frame.data.len() + 4);
    adu.push(frame.slave_id);
    adu.push(frame.function);
    adu.extend_from_slice(&frame.data);
    let sum = crc16(&adu);
    adu.extend_from_slice(&sum.to_le_bytes());

    Ok(adu)
}

/// Bytes still to read after the 3-byte head, given the function code and
/// the head's third byte.
///
/// Exception replies and anything unrecognized carry no body past the head,
/// so only the CRC remains; a reply that is actually longer desynchronizes
/// the stream until the CRC check throws it away.
fn tail_len(function: u8, third: u8) -> usize {
    if function & EXCEPTION_FLAG != 0 {
        2
    } else if is_read_function(function) {
        2 + third as usize
    } else if is_write_function(function) {
        5
    } else {
        2
    }
}

/// Read one complete frame off the stream and validate its CRC.
///
/// I/O failures surface as [`ModbusError::Io`]; a bad trailer as
/// [`ModbusError::CrcMismatch`]. Neither consumes more of the stream than
/// the frame the head promised.
pub async fn decode<R>(reader: &mut R) -> ModbusResult<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 3];
    reader.read_exact(&mut head).await?;

    let function = head[1];
    let tail = tail_len(function, head[2]);

    let mut adu = vec![0u8; 3 + tail];
    adu[..3].copy_from_slice(&head);
    reader.read_exact(&mut adu[3..]).await?;

    validate(&adu)?;

    let body = adu[2..adu.len() - 2].to_vec();
    Ok(Frame {
        slave_id: adu[0],
        function,
        data: Bytes::from(body),
    })
}

fn validate(adu: &[u8]) -> ModbusResult<()> {
    if adu.len() < 4 {
        return Err(ModbusError::frame("invalid adu size"));
    }

    let crc_idx = adu.len() - 2;
    let expected = crc16(&adu[..crc_idx]);
    let actual = u16::from_le_bytes([adu[crc_idx], adu[crc_idx + 1]]);
    if expected != actual {
        return Err(ModbusError::CrcMismatch { expected, actual });
    }

    Ok(())
}
