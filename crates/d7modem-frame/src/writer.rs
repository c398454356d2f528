use std::io::{ErrorKind, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{encode_frame, HEADER_SIZE, MAX_PAYLOAD};
use crate::error::{FrameError, Result};
use crate::message::MessageType;

/// TX queue size that fits exactly one maximal frame.
pub const DEFAULT_TX_QUEUE_CAPACITY: usize = HEADER_SIZE + MAX_PAYLOAD;

/// Pause between retries while the stream reports `WouldBlock`.
const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(1);

/// Anything that can put a typed payload on the wire.
///
/// Returns the frame counter the payload was sent with.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, message_type: MessageType, payload: &[u8]) -> Result<u8>;
}

/// Serializes payloads into frames through a bounded TX queue.
///
/// Owns the uplink frame counter: every successfully queued frame gets the
/// next counter value, starting with 1.
pub struct FrameWriter<T> {
    inner: T,
    queue: BytesMut,
    capacity: usize,
    up_counter: u8,
}

impl<T: Write> FrameWriter<T> {
    /// Create a frame writer with the default TX queue capacity.
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, DEFAULT_TX_QUEUE_CAPACITY)
    }

    /// Create a frame writer with an explicit TX queue capacity.
    pub fn with_capacity(inner: T, capacity: usize) -> Self {
        Self {
            inner,
            queue: BytesMut::with_capacity(capacity),
            capacity,
            up_counter: 0,
        }
    }

    /// Encode `payload` as one frame, queue it and flush the queue.
    ///
    /// Nothing is queued and the counter is left untouched when the payload
    /// is too large or the frame does not fit in the TX queue.
    ///
    /// When the flush fails, the unwritten rest of this frame is dropped
    /// from the queue so it never reaches the wire later. If none of it was
    /// written, the counter is rolled back as well.
    pub fn send(&mut self, message_type: MessageType, payload: &[u8]) -> Result<u8> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let needed = HEADER_SIZE + payload.len();
        if self.queue.len() + needed > self.capacity {
            return Err(FrameError::QueueFull {
                needed,
                capacity: self.capacity - self.queue.len(),
            });
        }

        let counter = self.up_counter.wrapping_add(1);
        encode_frame(counter, message_type, payload, &mut self.queue)?;
        self.up_counter = counter;
        debug!(
            counter,
            message_type = %message_type,
            len = payload.len(),
            "tx frame"
        );

        if let Err(err) = self.flush_queue() {
            let unsent = self.queue.len().min(needed);
            self.queue.truncate(self.queue.len() - unsent);
            if unsent == needed {
                self.up_counter = counter.wrapping_sub(1);
            }
            warn!(counter, unsent, %err, "tx frame dropped");
            return Err(err);
        }
        Ok(counter)
    }

    /// Write every queued byte to the underlying stream and flush it.
    pub fn flush_queue(&mut self) -> Result<()> {
        while !self.queue.is_empty() {
            match self.inner.write(&self.queue) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.queue.advance(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(WOULD_BLOCK_BACKOFF)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(WOULD_BLOCK_BACKOFF)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Counter carried by the most recently sent frame (0 before the first).
    pub fn counter(&self) -> u8 {
        self.up_counter
    }

    /// Bytes waiting in the TX queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// A [`FrameWriter`] shared between caller threads and the receive worker.
pub struct Transmitter {
    writer: Mutex<FrameWriter<Box<dyn Write + Send>>>,
}

impl Transmitter {
    pub fn new(inner: impl Write + Send + 'static, capacity: usize) -> Self {
        Self {
            writer: Mutex::new(FrameWriter::with_capacity(Box::new(inner), capacity)),
        }
    }

    /// Counter carried by the most recently sent frame.
    pub fn counter(&self) -> u8 {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counter()
    }
}

impl FrameSink for Transmitter {
    fn send_frame(&self, message_type: MessageType, payload: &[u8]) -> Result<u8> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(message_type, payload)
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Transmitter")
            .field("counter", &writer.counter())
            .field("queued", &writer.queued())
            .field("capacity", &writer.capacity())
            .finish()
    }
}
