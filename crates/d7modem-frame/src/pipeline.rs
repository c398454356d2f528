use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::Frame;
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::ingress::IngressConsumer;
use crate::message::MessageType;
use crate::writer::FrameSink;

/// Payload the host sends in its own ping requests.
pub const PING_REQUEST: [u8; 1] = [0x01];

/// Payload of the automatic answer to a peer's ping request.
pub const PING_REPLY: [u8; 1] = [0x02];

/// Handler invoked for every verified frame of a registered type.
pub type FrameHandler = Box<dyn FnMut(&Frame) + Send>;

/// Snapshot of receive-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Counters from frame reassembly.
    pub decoder: DecoderStats,
    /// Frames handed to a registered handler.
    pub dispatched: u64,
    /// Verified frames with no handler (unknown or unregistered types).
    pub unhandled: u64,
    /// Automatic ping replies sent.
    pub ping_replies: u64,
}

/// Turns received bytes into verified frames and routes them by type.
pub struct ReceivePipeline {
    decoder: FrameDecoder,
    handlers: HashMap<MessageType, FrameHandler>,
    ping_sink: Option<Arc<dyn FrameSink>>,
    dispatched: u64,
    unhandled: u64,
    ping_replies: u64,
}

impl Default for ReceivePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceivePipeline {
    pub fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(),
            handlers: HashMap::new(),
            ping_sink: None,
            dispatched: 0,
            unhandled: 0,
            ping_replies: 0,
        }
    }

    /// Answer ping requests through `sink`.
    pub fn with_ping_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.ping_sink = Some(sink);
        self
    }

    /// Register the handler for `message_type`, replacing any previous one.
    ///
    /// Ping requests are answered by the pipeline itself and unknown types
    /// are never dispatched; registering either returns `false`.
    pub fn register_handler(&mut self, message_type: MessageType, handler: FrameHandler) -> bool {
        match message_type {
            MessageType::PingRequest | MessageType::Unknown(_) => false,
            _ => {
                self.handlers.insert(message_type, handler);
                true
            }
        }
    }

    /// Append received bytes without processing them.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.decoder.extend(bytes);
    }

    /// Drain `ingress` into the pipeline and process what arrived.
    pub fn feed(&mut self, ingress: &IngressConsumer) -> usize {
        self.decoder.extend_from_ingress(ingress);
        self.process()
    }

    /// Decode and dispatch frames until more bytes are needed.
    ///
    /// Returns the number of verified frames handled in this call.
    pub fn process(&mut self) -> usize {
        let mut handled = 0;
        while let Some(frame) = self.decoder.decode() {
            handled += 1;
            self.dispatch(&frame);
        }
        handled
    }

    fn dispatch(&mut self, frame: &Frame) {
        let message_type = frame.message_type();
        if message_type == MessageType::PingRequest {
            self.answer_ping(frame);
            return;
        }

        match self.handlers.get_mut(&message_type) {
            Some(handler) => {
                handler(frame);
                self.dispatched += 1;
            }
            None => {
                self.unhandled += 1;
                warn!(
                    message_type = %message_type,
                    len = frame.payload.len(),
                    "no handler for frame"
                );
            }
        }
    }

    fn answer_ping(&mut self, frame: &Frame) {
        debug!(counter = frame.counter(), "ping request");
        let Some(sink) = &self.ping_sink else {
            warn!("ping request received but no reply path attached");
            return;
        };
        match sink.send_frame(MessageType::PingResponse, &PING_REPLY) {
            Ok(_) => self.ping_replies += 1,
            Err(err) => warn!(%err, "failed to answer ping request"),
        }
    }

    /// Whether a header has been consumed and its payload is still awaited.
    pub fn awaiting_payload(&self) -> bool {
        self.decoder.awaiting_payload()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            decoder: self.decoder.stats(),
            dispatched: self.dispatched,
            unhandled: self.unhandled,
            ping_replies: self.ping_replies,
        }
    }
}

impl std::fmt::Debug for ReceivePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.handlers.keys().map(|ty| ty.name()).collect();
        registered.sort_unstable();
        f.debug_struct("ReceivePipeline")
            .field("registered", &registered)
            .field("ping_sink", &self.ping_sink.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}
