use std::io::{ErrorKind, Read};

use crate::codec::Frame;
use crate::decoder::{DecoderStats, FrameDecoder};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 256;

/// Reads verified frames from any `Read` stream.
///
/// Handles partial reads, resynchronization and checksum failures
/// internally. Callers only ever see complete, verified frames.
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
        }
    }

    /// Read the next verified frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Read timeouts surface as `FrameError::Io` with the parse state kept,
    /// so the call can simply be retried.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode() {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.decoder.extend(&chunk[..read]);
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}
