//! Bounded byte queue between the link reader and the receive worker.
//!
//! The producer side never blocks: bytes arriving while the queue is full
//! are dropped and counted. Each accepted byte wakes the consumer thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use crossbeam_queue::ArrayQueue;
use tracing::warn;

/// Queue capacity used when none is configured.
pub const DEFAULT_INGRESS_CAPACITY: usize = 256;

struct Shared {
    queue: ArrayQueue<u8>,
    consumer: OnceLock<Thread>,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn wake(&self) {
        if let Some(thread) = self.consumer.get() {
            thread.unpark();
        }
    }
}

/// Create a connected producer/consumer pair.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn ingress(capacity: usize) -> (IngressProducer, IngressConsumer) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(capacity),
        consumer: OnceLock::new(),
        dropped: AtomicU64::new(0),
        closed: AtomicBool::new(false),
    });
    (
        IngressProducer {
            shared: Arc::clone(&shared),
        },
        IngressConsumer { shared },
    )
}

/// Write side of the ingress queue. Cheap to clone.
#[derive(Clone)]
pub struct IngressProducer {
    shared: Arc<Shared>,
}

impl IngressProducer {
    /// Queue one byte. Returns `false` if it was dropped because the queue is full.
    pub fn push_byte(&self, byte: u8) -> bool {
        let accepted = self.shared.queue.push(byte).is_ok();
        if accepted {
            self.shared.wake();
        } else {
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped, "ingress queue full, byte dropped");
        }
        accepted
    }

    /// Queue every byte of `bytes`. Returns the number accepted.
    pub fn push_slice(&self, bytes: &[u8]) -> usize {
        bytes.iter().filter(|byte| self.push_byte(**byte)).count()
    }

    /// Total bytes dropped so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Mark the stream as finished and wake the consumer.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for IngressProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressProducer")
            .field("queued", &self.shared.queue.len())
            .field("capacity", &self.shared.queue.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Read side of the ingress queue.
///
/// The first thread to call [`IngressConsumer::drain_into`] or
/// [`IngressConsumer::wait`] becomes the thread woken by the producer.
pub struct IngressConsumer {
    shared: Arc<Shared>,
}

impl IngressConsumer {
    fn bind(&self) {
        self.shared.consumer.get_or_init(thread::current);
    }

    /// Move all queued bytes into `dst`. Returns the number moved.
    pub fn drain_into(&self, dst: &mut BytesMut) -> usize {
        self.bind();
        dst.reserve(self.shared.queue.len());
        let mut moved = 0;
        while let Some(byte) = self.shared.queue.pop() {
            dst.put_u8(byte);
            moved += 1;
        }
        moved
    }

    /// Block until bytes are queued, the producer closes, or `timeout` elapses.
    ///
    /// Returns `true` when bytes are available. Spurious wakeups are possible.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.bind();
        if self.shared.queue.is_empty() && !self.is_closed() {
            thread::park_timeout(timeout);
        }
        !self.shared.queue.is_empty()
    }

    /// Number of bytes currently queued.
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Total bytes dropped so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Mark the stream as finished. Used by the consumer's owner on shutdown.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for IngressConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressConsumer")
            .field("queued", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}
