use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_CMS};
use tracing::warn;

use crate::error::{FrameError, Result};
use crate::message::MessageType;

/// Frame header: sync (1) + version (1) + counter (1) + type (1) + length (1) + crc (2).
pub const HEADER_SIZE: usize = 7;

/// First byte of every frame.
pub const SYNC_BYTE: u8 = 0xC0;

/// Protocol version carried in every frame.
pub const VERSION: u8 = 0x00;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

const OFFSET_COUNTER: usize = 2;
const OFFSET_TYPE: usize = 3;
const OFFSET_LENGTH: usize = 4;
const OFFSET_CRC_HI: usize = 5;
const OFFSET_CRC_LO: usize = 6;

// Poly 0x8005, init 0xFFFF, MSB-first, no final xor: the modem's table-driven CRC.
const FRAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_CMS);

/// CRC-16 as computed by the modem firmware over a frame payload.
pub fn crc16(payload: &[u8]) -> u16 {
    FRAME_CRC.checksum(payload)
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Sender's rolling frame counter.
    pub counter: u8,
    /// Payload type.
    pub message_type: MessageType,
    /// Declared payload length.
    pub length: u8,
    /// CRC-16 of the payload.
    pub checksum: u16,
}

impl FrameHeader {
    /// Build the header describing `payload`.
    pub fn for_payload(counter: u8, message_type: MessageType, payload: &[u8]) -> Result<Self> {
        let length = u8::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        })?;
        Ok(Self {
            counter,
            message_type,
            length,
            checksum: crc16(payload),
        })
    }

    /// Parse a header candidate. Only the sync and version bytes are checked.
    pub fn parse(window: &[u8; HEADER_SIZE]) -> Result<Self> {
        if window[0] != SYNC_BYTE || window[1] != VERSION {
            return Err(FrameError::InvalidSync {
                sync: window[0],
                version: window[1],
            });
        }

        Ok(Self {
            counter: window[OFFSET_COUNTER],
            message_type: MessageType::from(window[OFFSET_TYPE]),
            length: window[OFFSET_LENGTH],
            checksum: u16::from_be_bytes([window[OFFSET_CRC_HI], window[OFFSET_CRC_LO]]),
        })
    }

    /// Serialize to wire order.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [crc_hi, crc_lo] = self.checksum.to_be_bytes();
        [
            SYNC_BYTE,
            VERSION,
            self.counter,
            self.message_type.as_u8(),
            self.length,
            crc_hi,
            crc_lo,
        ]
    }

    /// Declared payload length in bytes.
    pub fn payload_len(&self) -> usize {
        usize::from(self.length)
    }

    /// Recompute the payload checksum and compare it with the header.
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        let actual = crc16(payload);
        if actual != self.checksum {
            return Err(FrameError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }
}

/// A verified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn counter(&self) -> u8 {
        self.header.counter
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬─────────┬─────────┬──────┬────────┬─────────────┬────────────────┐
/// │ Sync │ Version │ Counter │ Type │ Length │ CRC-16 (BE) │ Payload        │
/// │ 0xC0 │ 0x00    │ (1B)    │ (1B) │ (1B)   │ (2B)        │ (Length bytes) │
/// └──────┴─────────┴─────────┴──────┴────────┴─────────────┴────────────────┘
/// ```
pub fn encode_frame(
    counter: u8,
    message_type: MessageType,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<FrameHeader> {
    let header = FrameHeader::for_payload(counter, message_type, payload)?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&header.to_bytes());
    dst.put_slice(payload);
    Ok(header)
}

/// A detected discontinuity in the peer's frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub expected: u8,
    pub observed: u8,
}

impl SequenceGap {
    /// Frames apparently lost between the expected and observed counters.
    pub fn missed(&self) -> u8 {
        self.observed.wrapping_sub(self.expected)
    }
}

/// Tracks the counter expected on the next received frame.
#[derive(Debug, Clone, Default)]
pub struct DownlinkCounter {
    last: u8,
}

impl DownlinkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter value the next frame should carry.
    pub fn expected(&self) -> u8 {
        self.last.wrapping_add(1)
    }

    /// Record a received counter. A mismatch is reported and the tracker
    /// resynchronizes to the observed value.
    pub fn observe(&mut self, counter: u8) -> Option<SequenceGap> {
        let expected = self.expected();
        self.last = counter;
        if counter == expected {
            return None;
        }

        let gap = SequenceGap {
            expected,
            observed: counter,
        };
        warn!(
            expected,
            observed = counter,
            missed = gap.missed(),
            "frame counter gap"
        );
        Some(gap)
    }
}
