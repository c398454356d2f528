//! Serial framing for the modem link.
//!
//! Every message exchanged with the modem is wrapped in a 7-byte header:
//! - A sync byte (`0xC0`) and version byte (`0x00`) for stream synchronization
//! - A rolling per-direction frame counter for gap detection
//! - A message type and a one-byte payload length
//! - A big-endian CRC-16 over the payload
//!
//! Received bytes enter through [`ingress`], are reassembled by the
//! [`FrameDecoder`] and dispatched by the [`ReceivePipeline`]. Outgoing
//! payloads go through the [`FrameWriter`].

pub mod codec;
pub mod decoder;
pub mod error;
pub mod ingress;
pub mod message;
pub mod pipeline;
pub mod reader;
pub mod writer;

pub use codec::{
    crc16, encode_frame, DownlinkCounter, Frame, FrameHeader, SequenceGap, HEADER_SIZE,
    MAX_PAYLOAD, SYNC_BYTE, VERSION,
};
pub use decoder::{DecoderStats, FrameDecoder};
pub use error::{FrameError, Result};
pub use ingress::{ingress, IngressConsumer, IngressProducer, DEFAULT_INGRESS_CAPACITY};
pub use message::MessageType;
pub use pipeline::{FrameHandler, PipelineStats, ReceivePipeline, PING_REPLY, PING_REQUEST};
pub use reader::FrameReader;
pub use writer::{FrameSink, FrameWriter, Transmitter, DEFAULT_TX_QUEUE_CAPACITY};
