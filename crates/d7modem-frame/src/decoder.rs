use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{DownlinkCounter, Frame, FrameHeader, HEADER_SIZE};
use crate::ingress::IngressConsumer;

const INITIAL_BUFFER_CAPACITY: usize = 512;

/// Counters describing what the decoder has seen on the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames that passed checksum validation.
    pub frames: u64,
    /// Frames discarded because of a checksum mismatch.
    pub checksum_failures: u64,
    /// Counter discontinuities observed on received frames.
    pub sequence_gaps: u64,
    /// Bytes skipped one at a time while searching for a header.
    pub resync_bytes: u64,
}

/// Incremental frame reassembly over a byte stream.
///
/// Parse state survives between calls, so a frame split across any number
/// of [`FrameDecoder::extend`] calls is reassembled correctly.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    pending: Option<FrameHeader>,
    downlink: DownlinkCounter,
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            pending: None,
            downlink: DownlinkCounter::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Append received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Move every byte currently queued in `ingress` into the decoder.
    pub fn extend_from_ingress(&mut self, ingress: &IngressConsumer) -> usize {
        ingress.drain_into(&mut self.buf)
    }

    /// Produce the next verified frame, or `None` when more bytes are needed.
    ///
    /// Bytes that cannot start a header are discarded one at a time. A frame
    /// whose checksum does not match is logged, counted and skipped; its
    /// declared payload length is consumed either way.
    pub fn decode(&mut self) -> Option<Frame> {
        loop {
            let header = match self.pending {
                Some(header) => header,
                None => {
                    if self.buf.len() < HEADER_SIZE {
                        return None;
                    }

                    let mut window = [0u8; HEADER_SIZE];
                    window.copy_from_slice(&self.buf[..HEADER_SIZE]);
                    match FrameHeader::parse(&window) {
                        Ok(header) => {
                            self.buf.advance(HEADER_SIZE);
                            self.pending = Some(header);
                            trace!(
                                counter = header.counter,
                                length = header.length,
                                "rx header"
                            );
                            header
                        }
                        Err(_) => {
                            self.buf.advance(1);
                            self.stats.resync_bytes += 1;
                            trace!("skip");
                            continue;
                        }
                    }
                }
            };

            if self.buf.len() < header.payload_len() {
                return None;
            }

            self.pending = None;
            let payload = self.buf.split_to(header.payload_len()).freeze();

            if self.downlink.observe(header.counter).is_some() {
                self.stats.sequence_gaps += 1;
            }

            match header.verify(&payload) {
                Ok(()) => {
                    self.stats.frames += 1;
                    debug!(
                        counter = header.counter,
                        message_type = %header.message_type,
                        len = payload.len(),
                        "rx frame"
                    );
                    return Some(Frame { header, payload });
                }
                Err(err) => {
                    self.stats.checksum_failures += 1;
                    warn!(counter = header.counter, %err, "discarding frame");
                }
            }
        }
    }

    /// Whether a header has been consumed and its payload is still awaited.
    pub fn awaiting_payload(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }
}
