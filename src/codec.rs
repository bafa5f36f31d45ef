//! Big-endian register field packing
//!
//! All multi-byte fields in Modbus payloads are big-endian 16-bit words;
//! these helpers are shared by the typed operation layer and its tests.

use bytes::{BufMut, Bytes, BytesMut};

/// `address ‖ count`, the common request payload of the read operations.
pub fn read_request(address: u16, count: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u16(address);
    buf.put_u16(count);
    buf.freeze()
}

/// Register values as consecutive big-endian words.
pub fn registers_to_be(values: &[u16]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * 2);
    for &value in values {
        buf.put_u16(value);
    }
    buf.freeze()
}

/// Consecutive big-endian words back into register values; a trailing odd
/// byte is ignored.
pub fn registers_from_be(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}
