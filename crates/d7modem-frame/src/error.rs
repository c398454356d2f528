/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The candidate header does not start with the sync and version bytes.
    #[error("invalid frame sync (expected 0xC0 0x00, got 0x{sync:02X} 0x{version:02X})")]
    InvalidSync { sync: u8, version: u8 },

    /// The payload checksum does not match the header.
    #[error("checksum mismatch (header 0x{expected:04X}, computed 0x{actual:04X})")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// The payload exceeds the one-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transmit queue cannot hold the encoded frame.
    #[error("transmit queue full ({needed} bytes needed, capacity {capacity})")]
    QueueFull { needed: usize, capacity: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
