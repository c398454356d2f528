//! Message types carried in the frame header.
//!
//! Values match the modem firmware's serial interface definitions.

use std::fmt;

/// Type of payload carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Structured command (ALP) data.
    AlpData,
    /// Liveness probe; answered automatically with [`MessageType::PingResponse`].
    PingRequest,
    /// Answer to a ping request.
    PingResponse,
    /// Free-form log text from the peer.
    Logging,
    /// A type this driver does not know about.
    Unknown(u8),
}

impl MessageType {
    pub const ALP_DATA: u8 = 0x01;
    pub const PING_REQUEST: u8 = 0x02;
    pub const PING_RESPONSE: u8 = 0x03;
    pub const LOGGING: u8 = 0x04;

    /// Wire value of this type.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::AlpData => Self::ALP_DATA,
            MessageType::PingRequest => Self::PING_REQUEST,
            MessageType::PingResponse => Self::PING_RESPONSE,
            MessageType::Logging => Self::LOGGING,
            MessageType::Unknown(raw) => raw,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::AlpData => "ALP_DATA",
            MessageType::PingRequest => "PING_REQUEST",
            MessageType::PingResponse => "PING_RESPONSE",
            MessageType::Logging => "LOGGING",
            MessageType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for MessageType {
    fn from(raw: u8) -> Self {
        match raw {
            Self::ALP_DATA => MessageType::AlpData,
            Self::PING_REQUEST => MessageType::PingRequest,
            Self::PING_RESPONSE => MessageType::PingResponse,
            Self::LOGGING => MessageType::Logging,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(ty: MessageType) -> Self {
        ty.as_u8()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Unknown(raw) => write!(f, "UNKNOWN(0x{raw:02X})"),
            other => f.write_str(other.name()),
        }
    }
}
