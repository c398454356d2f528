//! ALP variable-length operand.
//!
//! The two most significant bits of the first byte hold the number of
//! additional bytes (0..=3). The remaining six bits and the additional
//! bytes form the value, big-endian.

use bytes::{BufMut, BytesMut};

use crate::error::{AlpError, Result};

/// Largest value the operand can carry (30 bits).
pub const MAX_LENGTH: u32 = 0x3FFF_FFFF;

/// Number of bytes `value` occupies on the wire.
pub fn encoded_len(value: u32) -> Result<usize> {
    match value {
        0..=0x3F => Ok(1),
        0x40..=0x3FFF => Ok(2),
        0x4000..=0x3F_FFFF => Ok(3),
        0x40_0000..=MAX_LENGTH => Ok(4),
        _ => Err(AlpError::LengthOverflow(u64::from(value))),
    }
}

/// Append `value` using the shortest encoding.
pub fn append_length(dst: &mut BytesMut, value: u32) -> Result<()> {
    let size = encoded_len(value)?;
    let extra = size - 1;
    let bytes = value.to_be_bytes();
    let mut encoded = [0u8; 4];
    encoded[..size].copy_from_slice(&bytes[4 - size..]);
    encoded[0] |= (extra as u8) << 6;
    dst.put_slice(&encoded[..size]);
    Ok(())
}

/// Length of a `usize` checked against the operand range.
pub fn checked_length(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_LENGTH)
        .ok_or(AlpError::LengthOverflow(len as u64))
}

/// Decode a length operand. Returns the value and the bytes consumed.
pub fn decode_length(src: &[u8]) -> Result<(u32, usize)> {
    let first = *src.first().ok_or(AlpError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let size = usize::from(first >> 6) + 1;
    if src.len() < size {
        return Err(AlpError::Truncated {
            needed: size,
            available: src.len(),
        });
    }

    let value = src[1..size]
        .iter()
        .fold(u32::from(first & 0x3F), |acc, byte| (acc << 8) | u32::from(*byte));
    Ok((value, size))
}
