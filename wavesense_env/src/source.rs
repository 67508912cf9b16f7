//! Byte source capability: the inbound UART boundary.

use crate::error::EnvError;
use std::collections::VecDeque;

/// An opaque byte producer.
///
/// The host's UART driver implements this in production. The pipeline
/// never interprets transport concerns (baud, DMA, buffering); it only
/// sees bytes.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning how many were written.
    /// Returning `Ok(0)` means "nothing available right now".
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EnvError>;
}

/// Scripted byte source for tests and simulation.
///
/// Chunk boundaries are preserved: each `read` drains at most one queued
/// chunk, so a script can reproduce any UART delivery pattern (byte-at-a-
/// time, partial frames, bursts spanning frames).
pub struct ReplaySource {
    chunks: VecDeque<Vec<u8>>,
}

impl ReplaySource {
    /// Creates an empty source; `Ok(0)` forever until chunks are pushed.
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
        }
    }

    /// Queues one delivery chunk.
    pub fn push(&mut self, chunk: impl Into<Vec<u8>>) {
        self.chunks.push_back(chunk.into());
    }

    /// Queues a byte slice split into `size`-byte deliveries.
    pub fn push_chunked(&mut self, bytes: &[u8], size: usize) {
        for piece in bytes.chunks(size.max(1)) {
            self.chunks.push_back(piece.to_vec());
        }
    }

    /// True when every queued chunk has been drained.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for ReplaySource {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for ReplaySource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EnvError> {
        let Some(front) = self.chunks.front_mut() else {
            return Ok(0);
        };
        let n = front.len().min(buf.len());
        buf[..n].copy_from_slice(&front[..n]);
        if n == front.len() {
            self.chunks.pop_front();
        } else {
            front.drain(..n);
        }
        Ok(n)
    }
}
